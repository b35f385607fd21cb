//! Stage parameter derivation
//!
//! Turns the user-facing [`SearchSettings`] into the exact argument lists the
//! search engine receives. Derivation is pure: the only external input is
//! whether every reference database used by the run carries an index.

use crate::config::SearchSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overrides applied when the MSA diversity filter is on
pub const FILTER_ALIGN_EVAL: u32 = 10;
pub const FILTER_QSC: f64 = 0.8;
pub const FILTER_MAX_ACCEPT: u32 = 100_000;

pub const SEARCH_ITERATIONS: u32 = 3;
pub const SEARCH_EVAL: f64 = 0.1;
pub const SEARCH_MAX_SEQS: u32 = 10_000;
/// Server k-mer thresholds, used when no sensitivity is given
pub const K_SCORE: &str = "seq:96,prof:80";

pub const MAX_SEQ_ID: f64 = 0.95;
pub const FILTER_MIN_ENABLE: u32 = 1000;
pub const QID_LADDER: &str = "0.0,0.2,0.4,0.6,0.8,1.0";

/// How `pairaln` matches hits across chains
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PairingStrategy {
    #[default]
    Greedy,
    Complete,
}

impl PairingStrategy {
    /// Value of `--pairing-mode`
    pub fn mode(&self) -> u8 {
        match self {
            PairingStrategy::Greedy => 0,
            PairingStrategy::Complete => 1,
        }
    }
}

impl fmt::Display for PairingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStrategy::Greedy => write!(f, "greedy"),
            PairingStrategy::Complete => write!(f, "complete"),
        }
    }
}

/// Render a float the way the engine's own tooling prints it
/// (`-20.0`, `0.8`, `inf`)
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{}inf", sign)
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Settings after the filter and index overrides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSettings {
    pub sensitivity: Option<f64>,
    pub filter: bool,
    pub expand_eval: f64,
    pub align_eval: u32,
    pub diff: u32,
    pub qsc: f64,
    pub max_accept: u32,
    pub pairing_strategy: PairingStrategy,
    pub db_load_mode: u8,
    pub threads: usize,
}

/// Iterative profile search arguments
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub db_load_mode: u8,
    pub sensitivity: Option<f64>,
}

impl SearchParams {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--num-iterations".to_string(),
            SEARCH_ITERATIONS.to_string(),
            "--db-load-mode".to_string(),
            self.db_load_mode.to_string(),
            "-a".to_string(),
            "-e".to_string(),
            format_float(SEARCH_EVAL),
            "--max-seqs".to_string(),
            SEARCH_MAX_SEQS.to_string(),
        ];
        match self.sensitivity {
            Some(s) => {
                args.push("-s".to_string());
                args.push(format!("{:.1}", s));
            }
            None => {
                args.push("--k-score".to_string());
                args.push(K_SCORE.to_string());
            }
        }
        args
    }
}

/// Alignment expansion arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandParams {
    pub expand_eval: f64,
    pub filter: bool,
}

impl ExpandParams {
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--expansion-mode".to_string(),
            "0".to_string(),
            "-e".to_string(),
            format_float(self.expand_eval),
            "--expand-filter-clusters".to_string(),
            flag(self.filter).to_string(),
            "--max-seq-id".to_string(),
            format_float(MAX_SEQ_ID),
        ]
    }
}

/// MSA formatting filter arguments
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub filter: bool,
    pub diff: u32,
}

impl FilterParams {
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--filter-msa".to_string(),
            flag(self.filter).to_string(),
            "--filter-min-enable".to_string(),
            FILTER_MIN_ENABLE.to_string(),
            "--diff".to_string(),
            self.diff.to_string(),
            "--qid".to_string(),
            QID_LADDER.to_string(),
            "--qsc".to_string(),
            "0".to_string(),
            "--max-seq-id".to_string(),
            format_float(MAX_SEQ_ID),
        ]
    }
}

/// Cross-chain pairing arguments
#[derive(Debug, Clone, PartialEq)]
pub struct PairingParams {
    pub strategy: PairingStrategy,
    /// E-value for the backtrace realignment between the pairing passes
    pub backtrace_eval: f64,
}

impl PairingParams {
    /// Arguments for one `pairaln` pass; `dummy` switches on dummy-hit insertion
    pub fn pass_args(&self, dummy: bool) -> Vec<String> {
        vec![
            "--pairing-mode".to_string(),
            self.strategy.mode().to_string(),
            "--pairing-dummy-mode".to_string(),
            flag(dummy).to_string(),
        ]
    }
}

/// Everything a pipeline needs to build its invocations
#[derive(Debug, Clone, PartialEq)]
pub struct StageParameters {
    pub effective: EffectiveSettings,
    pub search: SearchParams,
    pub expand: ExpandParams,
    pub filter: FilterParams,
    pub pairing: PairingParams,
}

impl StageParameters {
    /// Apply the filter override, then the index override, and build the
    /// per-stage argument groups
    pub fn derive(settings: &SearchSettings, all_indexed: bool) -> Self {
        let (align_eval, qsc, max_accept) = if settings.filter {
            (FILTER_ALIGN_EVAL, FILTER_QSC, FILTER_MAX_ACCEPT)
        } else {
            (settings.align_eval, settings.qsc, settings.max_accept)
        };
        let db_load_mode = if all_indexed {
            settings.db_load_mode
        } else {
            0
        };

        let effective = EffectiveSettings {
            sensitivity: settings.sensitivity,
            filter: settings.filter,
            expand_eval: settings.expand_eval,
            align_eval,
            diff: settings.diff,
            qsc,
            max_accept,
            pairing_strategy: settings.pairing_strategy,
            db_load_mode,
            threads: settings.threads,
        };

        Self {
            search: SearchParams {
                db_load_mode,
                sensitivity: settings.sensitivity,
            },
            expand: ExpandParams {
                expand_eval: settings.expand_eval,
                filter: settings.filter,
            },
            filter: FilterParams {
                filter: settings.filter,
                diff: settings.diff,
            },
            pairing: PairingParams {
                strategy: settings.pairing_strategy,
                backtrace_eval: f64::INFINITY,
            },
            effective,
        }
    }

    pub fn db_load_mode_args(&self) -> [String; 2] {
        [
            "--db-load-mode".to_string(),
            self.effective.db_load_mode.to_string(),
        ]
    }

    pub fn threads_args(&self) -> [String; 2] {
        ["--threads".to_string(), self.effective.threads.to_string()]
    }

    /// `-e`/`--max-accept` for the realignment stages
    pub fn realign_args(&self) -> Vec<String> {
        vec![
            "-e".to_string(),
            self.effective.align_eval.to_string(),
            "--max-accept".to_string(),
            self.effective.max_accept.to_string(),
        ]
    }

    /// `--qsc` value for the pre-format filter stages
    pub fn qsc_arg(&self) -> String {
        format_float(self.effective.qsc)
    }
}

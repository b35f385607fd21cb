//! Pairing pipeline: cross-chain paired MSAs for complexes
//!
//! Starts from the realigned alignment left behind by the monomer pipeline.
//! CLEANUP always runs, even after a failed stage. Every removal it performs
//! is a no-op for databases that were never created.

use crate::error::SearchResult;
use crate::pipeline::database::DbHandle;
use crate::pipeline::janitor::{Artifact, CleanupReport};
use crate::pipeline::monomer::{unpack_invocation, RES, RES_EXP, RES_EXP_REALIGN};
use crate::pipeline::params::format_float;
use crate::pipeline::stage::{run_steps, Stage, Step, TeardownPolicy};
use crate::pipeline::workspace::PipelineRun;
use crate::pipeline::PipelineContext;
use crate::tools::Invocation;
use std::fmt;

pub const PIPELINE: &str = "pair";

pub const RES_EXP_REALIGN_PAIR: &str = "res_exp_realign_pair";
pub const RES_EXP_REALIGN_PAIR_BT: &str = "res_exp_realign_pair_bt";
pub const RES_FINAL: &str = "res_final";
pub const PAIR_A3M: &str = "pair.a3m";
pub const PAIRED_SUFFIX: &str = ".paired.a3m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairStage {
    PairAlign1,
    RealignBacktrace,
    PairAlign2,
    FormatPairedMsa,
    UnpackPaired,
    Cleanup,
}

impl PairStage {
    pub const PLAN: [PairStage; 6] = [
        PairStage::PairAlign1,
        PairStage::RealignBacktrace,
        PairStage::PairAlign2,
        PairStage::FormatPairedMsa,
        PairStage::UnpackPaired,
        PairStage::Cleanup,
    ];
}

impl fmt::Display for PairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairStage::PairAlign1 => "PAIR_ALIGN_1",
            PairStage::RealignBacktrace => "REALIGN_BACKTRACE",
            PairStage::PairAlign2 => "PAIR_ALIGN_2",
            PairStage::FormatPairedMsa => "FORMAT_PAIRED_MSA",
            PairStage::UnpackPaired => "UNPACK_PAIRED",
            PairStage::Cleanup => "CLEANUP",
        };
        write!(f, "{}", name)
    }
}

pub struct PairingPipeline<'a> {
    ctx: PipelineContext<'a>,
}

impl<'a> PairingPipeline<'a> {
    pub fn new(ctx: PipelineContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run the pairing stages. The original stage failure wins over any
    /// cleanup warning.
    pub fn run(&self, run: &mut PipelineRun) -> SearchResult<CleanupReport> {
        let steps = self.steps(run);
        run_steps(self.ctx.tool, run, PIPELINE, &steps, TeardownPolicy::Always)
    }

    pub fn steps(&self, run: &PipelineRun) -> Vec<Step<PairStage>> {
        let params = self.ctx.params;
        let uniref = self.ctx.databases.uniref();
        let qdb = run.query_db();
        let realigned = run.db(RES_EXP_REALIGN);
        let paired = run.db(RES_EXP_REALIGN_PAIR);
        let backtraced = run.db(RES_EXP_REALIGN_PAIR_BT);
        let res_final = run.db(RES_FINAL);
        let pair_msa = run.db(PAIR_A3M);

        let pair_align = |input: &DbHandle, output: &DbHandle, dummy: bool| {
            Invocation::new("pairaln")
                .arg(&qdb)
                .arg(uniref.root())
                .arg(input)
                .arg(output)
                .args(params.db_load_mode_args())
                .args(params.pairing.pass_args(dummy))
                .args(params.threads_args())
        };

        let backtrace = Invocation::new("align")
            .arg(&qdb)
            .arg(uniref.sequences())
            .arg(&paired)
            .arg(&backtraced)
            .args(params.db_load_mode_args())
            .arg("-e")
            .arg(format_float(params.pairing.backtrace_eval))
            .arg("-a")
            .args(params.threads_args());

        let format = Invocation::new("result2msa")
            .arg(&qdb)
            .arg(uniref.sequences())
            .arg(&res_final)
            .arg(&pair_msa)
            .args(params.db_load_mode_args())
            .args(["--msa-format-mode", "5"])
            .args(params.threads_args());

        vec![
            Step::Invoke(
                Stage::fatal(PairStage::PairAlign1, pair_align(&realigned, &paired, false))
                    .requiring(realigned.clone())
                    .producing(paired.clone()),
            ),
            Step::Invoke(
                Stage::fatal(PairStage::RealignBacktrace, backtrace)
                    .requiring(paired)
                    .producing(backtraced.clone()),
            ),
            Step::Invoke(
                Stage::fatal(PairStage::PairAlign2, pair_align(&backtraced, &res_final, true))
                    .requiring(backtraced)
                    .producing(res_final.clone()),
            ),
            Step::Invoke(
                Stage::fatal(PairStage::FormatPairedMsa, format)
                    .requiring(res_final)
                    .producing(pair_msa.clone()),
            ),
            Step::Invoke(
                Stage::fatal(
                    PairStage::UnpackPaired,
                    unpack_invocation(&pair_msa, run, PAIRED_SUFFIX),
                )
                .requiring(pair_msa),
            ),
            Step::Sweep {
                state: PairStage::Cleanup,
                artifacts: self.teardown_artifacts(run),
            },
        ]
    }

    /// Query database, monomer leftovers and both pairing passes
    pub fn teardown_artifacts(&self, run: &PipelineRun) -> Vec<Artifact> {
        let qdb = run.query_db();
        let mut artifacts = vec![
            Artifact::Database(qdb.header()),
            Artifact::Database(qdb),
        ];
        artifacts.extend(
            [
                RES,
                RES_EXP,
                RES_EXP_REALIGN,
                RES_EXP_REALIGN_PAIR,
                RES_EXP_REALIGN_PAIR_BT,
                RES_FINAL,
                PAIR_A3M,
            ]
            .into_iter()
            .map(|name| Artifact::Database(run.db(name))),
        );
        artifacts.push(Artifact::Directory(run.tmp_dir()));
        artifacts
    }
}

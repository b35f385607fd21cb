pub mod output;

use crate::config::{default_config, load_config, Config};
use crate::error::SearchResult;
use crate::pipeline::PairingStrategy;
use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "msa-search",
    version,
    about = "Build multiple sequence alignments for protein queries with MMseqs2",
    long_about = "msa-search drives an MMseqs2 binary through an iterative profile search \
                  against UniRef (optionally templates and environmental databases), writes one \
                  unpaired MSA per query job and, for complexes, pairs hits across chains."
)]
pub struct Cli {
    /// Query FASTA, CSV/TSV table (id,sequence) or directory of FASTA files
    #[arg(value_name = "QUERY")]
    pub query: PathBuf,

    /// Directory holding the reference databases
    #[arg(value_name = "DBBASE")]
    pub dbbase: PathBuf,

    /// Output directory; also used as the working directory
    #[arg(value_name = "BASE")]
    pub base: PathBuf,

    /// Search sensitivity (default: server k-mer thresholds)
    #[arg(short = 's', long)]
    pub sensitivity: Option<f64>,

    /// UniRef database name
    #[arg(long = "db1", value_name = "NAME")]
    pub uniref_db: Option<String>,

    /// Template database name
    #[arg(long = "db2", value_name = "NAME")]
    pub template_db: Option<String>,

    /// Environmental database name
    #[arg(long = "db3", value_name = "NAME")]
    pub metagenomic_db: Option<String>,

    /// Search the environmental database (required here or in the config file)
    #[arg(long, value_name = "0|1", value_parser = BoolishValueParser::new())]
    pub use_env: Option<bool>,

    /// Search the template database (required here or in the config file)
    #[arg(long, value_name = "0|1", value_parser = BoolishValueParser::new())]
    pub use_templates: Option<bool>,

    /// Diversity filter for the final MSA
    #[arg(long, value_name = "0|1", value_parser = BoolishValueParser::new())]
    pub filter: Option<bool>,

    /// E-value cutoff for alignment expansion (accepts `inf`)
    #[arg(long)]
    pub expand_eval: Option<f64>,

    /// E-value cutoff for realignment (ignored while filtering)
    #[arg(long)]
    pub align_eval: Option<u32>,

    /// Keep at least this many most diverse sequences
    #[arg(long)]
    pub diff: Option<u32>,

    /// Minimum score per column (ignored while filtering)
    #[arg(long, allow_negative_numbers = true)]
    pub qsc: Option<f64>,

    /// Maximum accepted alignments per query (ignored while filtering)
    #[arg(long)]
    pub max_accept: Option<u32>,

    /// Cross-chain pairing strategy
    #[arg(long, value_enum)]
    pub pairing_strategy: Option<PairingStrategy>,

    /// Database preload mode (forced to 0 for unindexed databases)
    #[arg(long)]
    pub db_load_mode: Option<u8>,

    /// Threads passed to every engine call
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// MMseqs2 binary (path or name on PATH)
    #[arg(long, env = "MMSEQS_BINARY", value_name = "PATH")]
    pub mmseqs: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep the query database and the realigned alignment after the run
    #[arg(long)]
    pub keep_intermediates: bool,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Layer the command line over the config file (or the defaults)
    pub fn resolve_config(&self) -> SearchResult<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => default_config(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        let search = &mut config.search;
        if self.sensitivity.is_some() {
            search.sensitivity = self.sensitivity;
        }
        if let Some(filter) = self.filter {
            search.filter = filter;
        }
        if let Some(expand_eval) = self.expand_eval {
            search.expand_eval = expand_eval;
        }
        if let Some(align_eval) = self.align_eval {
            search.align_eval = align_eval;
        }
        if let Some(diff) = self.diff {
            search.diff = diff;
        }
        if let Some(qsc) = self.qsc {
            search.qsc = qsc;
        }
        if let Some(max_accept) = self.max_accept {
            search.max_accept = max_accept;
        }
        if let Some(strategy) = self.pairing_strategy {
            search.pairing_strategy = strategy;
        }
        if let Some(mode) = self.db_load_mode {
            search.db_load_mode = mode;
        }
        if let Some(threads) = self.threads {
            search.threads = threads;
        }

        let databases = &mut config.databases;
        if let Some(name) = &self.uniref_db {
            databases.uniref_db = name.clone();
        }
        if let Some(name) = &self.template_db {
            databases.template_db = name.clone();
        }
        if let Some(name) = &self.metagenomic_db {
            databases.metagenomic_db = name.clone();
        }
        if self.use_env.is_some() {
            databases.use_env = self.use_env;
        }
        if self.use_templates.is_some() {
            databases.use_templates = self.use_templates;
        }

        if let Some(mmseqs) = &self.mmseqs {
            config.tool.mmseqs = mmseqs.clone();
        }
        if self.keep_intermediates {
            config.tool.keep_intermediates = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::save_config;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_parses_bool_and_enum_values() {
        let cli = Cli::try_parse_from([
            "msa-search",
            "q.fasta",
            "/db",
            "out",
            "--use-env",
            "true",
            "--use-templates",
            "false",
            "--pairing-strategy",
            "complete",
            "--qsc",
            "-10",
            "--expand-eval",
            "inf",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.use_env, Some(true));
        assert_eq!(cli.use_templates, Some(false));
        assert_eq!(cli.pairing_strategy, Some(PairingStrategy::Complete));
        assert_eq!(cli.qsc, Some(-10.0));
        assert!(cli.expand_eval.unwrap().is_infinite());
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_toggles_accept_numeric_values() {
        let cli = Cli::try_parse_from([
            "msa-search", "q.fasta", "/db", "out", "--filter", "0", "--use-env", "1",
            "--use-templates", "0",
        ])
        .unwrap();
        assert_eq!(cli.filter, Some(false));
        assert_eq!(cli.use_env, Some(true));
        assert_eq!(cli.use_templates, Some(false));

        let cli = Cli::try_parse_from(["msa-search", "q.fasta", "/db", "out", "--filter", "1"])
            .unwrap();
        assert_eq!(cli.filter, Some(true));

        let result = Cli::try_parse_from(["msa-search", "q.fasta", "/db", "out", "--filter", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file_config = Config::default();
        file_config.search.diff = 500;
        file_config.search.threads = 8;
        file_config.databases.use_env = Some(true);
        file_config.databases.use_templates = Some(false);
        let file = NamedTempFile::new().unwrap();
        save_config(file.path(), &file_config).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "msa-search", "q.fasta", "/db", "out", "--config", &path, "--threads", "4",
            "--use-env", "false", "--db1", "uniref_small",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.search.threads, 4);
        assert_eq!(config.search.diff, 500);
        assert_eq!(config.databases.use_env, Some(false));
        assert_eq!(config.databases.use_templates, Some(false));
        assert_eq!(config.databases.uniref_db, "uniref_small");
    }

    #[test]
    fn test_missing_toggles_stay_unset() {
        let cli = Cli::try_parse_from(["msa-search", "q.fasta", "/db", "out"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert!(config.databases.toggles().is_err());
    }
}

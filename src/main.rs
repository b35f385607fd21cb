use clap::Parser;
use colored::*;
use msa_search::cli::{output, Cli};
use msa_search::query::read_queries;
use msa_search::tools::MmseqsRunner;
use msa_search::{run_search, SearchError};
use std::process;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins, then -v/-vv, then MSA_SEARCH_LOG
    let log_level = match cli.verbose {
        0 => std::env::var("MSA_SEARCH_LOG").unwrap_or_else(|_| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        let exit_code = match e.downcast_ref::<SearchError>() {
            Some(SearchError::Configuration(_)) => 2,
            Some(SearchError::Io(_)) => 3,
            Some(SearchError::Parse(_)) | Some(SearchError::InvalidInput(_)) => 4,
            Some(SearchError::ToolFailure { .. }) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;
    // Fail on unset toggles before looking for the binary
    config.databases.toggles()?;

    let runner = MmseqsRunner::new(&config.tool.mmseqs)?;
    match runner.version() {
        Ok(version) => info!("Using MMseqs2 {} at {}", version, runner.binary_path().display()),
        Err(e) => debug!("Could not read MMseqs2 version: {}", e),
    }

    let queries = read_queries(&cli.query)?;
    let summary = run_search(&runner, &queries, &cli.dbbase, &cli.base, &config)?;
    output::print_summary(&summary);

    Ok(())
}

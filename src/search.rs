//! End-to-end MSA search for a batch of query jobs

use crate::assemble::assemble_results;
use crate::config::Config;
use crate::error::SearchResult;
use crate::pipeline::janitor::{Artifact, ArtifactJanitor, CleanupReport};
use crate::pipeline::monomer::RES_EXP_REALIGN;
use crate::pipeline::stage::{execute_stage, Stage};
use crate::pipeline::{
    MonomerPipeline, PairingPipeline, PipelineContext, PipelineRun, ReferenceDatabases,
    StageParameters,
};
use crate::query::{normalize, write_query_fasta, QueryRecord};
use crate::tools::{Invocation, SearchTool};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a finished run produced
#[derive(Debug)]
pub struct SearchSummary {
    pub jobs: usize,
    pub sequences: usize,
    pub paired: bool,
    pub outputs: Vec<PathBuf>,
    pub cleanup: CleanupReport,
}

/// Run the monomer pipeline (and the pairing pipeline for complexes) over
/// `queries`, leaving one combined MSA per job in `base`.
///
/// Reference databases are validated before anything is written.
pub fn run_search(
    tool: &dyn SearchTool,
    queries: &[QueryRecord],
    dbbase: &Path,
    base: &Path,
    config: &Config,
) -> SearchResult<SearchSummary> {
    let toggles = config.databases.toggles()?;
    let databases = ReferenceDatabases::resolve(dbbase, &config.databases, toggles)?;
    let params = StageParameters::derive(&config.search, databases.all_indexed());

    let normalized = normalize(queries);
    info!(
        "Searching {} jobs with {} distinct sequences",
        normalized.jobs.len(),
        normalized.index.len()
    );

    let mut run = PipelineRun::create(base)?;
    run.set_counts(normalized.jobs.len(), normalized.index.len())?;
    let written = write_query_fasta(&normalized.jobs, run.query_fasta());
    recorded(&mut run, written)?;

    let qdb = run.query_db();
    let createdb = Stage::fatal(
        "CREATEDB",
        Invocation::new("createdb")
            .arg(run.query_fasta())
            .arg(&qdb)
            .args(["--shuffle", "0"]),
    )
    .producing(qdb.header())
    .producing(qdb);
    execute_stage(tool, &mut run, "query", &createdb)?;
    let written = normalized.index.write_lookup(run.lookup_path());
    recorded(&mut run, written)?;

    let ctx = PipelineContext::new(tool, &databases, &params);
    let mut cleanup = MonomerPipeline::new(ctx, toggles)?.run(&mut run)?;

    let paired = normalized.is_complex();
    if paired {
        cleanup.merge(PairingPipeline::new(ctx).run(&mut run)?);
    }

    let template_db = databases.template().map(|db| db.name.as_str());
    let assembled = assemble_results(run.root(), &normalized, paired, template_db);
    let outputs = recorded(&mut run, assembled)?;

    if config.tool.keep_intermediates {
        info!("Keeping query database and retained alignments in {}", base.display());
    } else {
        let artifacts = [
            Artifact::File(run.query_fasta()),
            Artifact::Database(run.query_db()),
            Artifact::Database(run.query_db().header()),
            Artifact::Database(run.db(RES_EXP_REALIGN)),
        ];
        let mut janitor = ArtifactJanitor::new(tool);
        janitor.sweep(&mut run, &artifacts);
        cleanup.merge(janitor.finish());
    }

    if !cleanup.is_clean() {
        warn!(
            "{} intermediates could not be removed",
            cleanup.warnings.len()
        );
    }
    run.mark_completed()?;

    Ok(SearchSummary {
        jobs: normalized.jobs.len(),
        sequences: normalized.index.len(),
        paired,
        outputs,
        cleanup,
    })
}

/// Store a failure in the run record before handing it back
fn recorded<T>(run: &mut PipelineRun, result: SearchResult<T>) -> SearchResult<T> {
    if let Err(e) = &result {
        run.mark_failed(e);
    }
    result
}

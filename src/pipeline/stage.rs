//! Stage description and the sequential stage executor shared by both pipelines

use crate::error::{SearchError, SearchResult};
use crate::pipeline::database::DbHandle;
use crate::pipeline::janitor::{Artifact, ArtifactJanitor, CleanupReport};
use crate::pipeline::workspace::PipelineRun;
use crate::tools::{Invocation, SearchTool};
use std::fmt;
use tracing::{info, warn};

/// One engine call together with the databases it creates and consumes.
///
/// A stage failure is always fatal. Best-effort removals go through
/// [`Step::Sweep`] instead.
#[derive(Debug, Clone)]
pub struct Stage<S> {
    pub state: S,
    pub invocation: Invocation,
    /// Run-owned databases an earlier stage must have produced
    pub requires: Vec<DbHandle>,
    pub produces: Vec<DbHandle>,
    pub retires: Vec<DbHandle>,
}

impl<S> Stage<S> {
    pub fn fatal(state: S, invocation: Invocation) -> Self {
        Self {
            state,
            invocation,
            requires: Vec::new(),
            produces: Vec::new(),
            retires: Vec::new(),
        }
    }

    pub fn requiring(mut self, db: DbHandle) -> Self {
        self.requires.push(db);
        self
    }

    pub fn producing(mut self, db: DbHandle) -> Self {
        self.produces.push(db);
        self
    }

    /// The stage moves or deletes `db`
    pub fn retiring(mut self, db: DbHandle) -> Self {
        self.retires.push(db);
        self
    }
}

/// Run one stage and update the live database set.
///
/// A failure marks the run as failed and propagates.
pub fn execute_stage<S: fmt::Display>(
    tool: &dyn SearchTool,
    run: &mut PipelineRun,
    pipeline: &str,
    stage: &Stage<S>,
) -> SearchResult<()> {
    run.enter_stage(format!("{}:{}", pipeline, stage.state));
    info!("[{}] {}", pipeline, stage.state);

    if let Some(missing) = stage.requires.iter().find(|db| !run.is_available(db)) {
        let err = SearchError::InvalidInput(format!(
            "{} requires {}, which no earlier stage produced",
            stage.state, missing
        ));
        run.mark_failed(&err);
        return Err(err);
    }

    if let Err(e) = tool.execute(&stage.invocation) {
        warn!("[{}] {} failed: {}", pipeline, stage.state, e);
        run.mark_failed(&e);
        return Err(e);
    }

    for db in &stage.retires {
        run.retire(db);
    }
    for db in &stage.produces {
        run.register(db.clone());
    }
    Ok(())
}

/// One entry of a pipeline plan
#[derive(Debug, Clone)]
pub enum Step<S> {
    Invoke(Stage<S>),
    /// Best-effort removal of temporaries
    Sweep { state: S, artifacts: Vec<Artifact> },
}

impl<S: Copy> Step<S> {
    pub fn state(&self) -> S {
        match self {
            Step::Invoke(stage) => stage.state,
            Step::Sweep { state, .. } => *state,
        }
    }
}

/// Whether sweep steps still run after a fatal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPolicy {
    OnSuccess,
    Always,
}

/// Drive a plan to completion.
///
/// The first fatal failure stops all later invocations. Under
/// [`TeardownPolicy::Always`] sweep steps still run afterwards, and the
/// original failure is what gets returned.
pub fn run_steps<S: fmt::Display + Copy>(
    tool: &dyn SearchTool,
    run: &mut PipelineRun,
    pipeline: &str,
    steps: &[Step<S>],
    teardown: TeardownPolicy,
) -> SearchResult<CleanupReport> {
    let mut report = CleanupReport::default();
    let mut failure: Option<SearchError> = None;

    for step in steps {
        match step {
            Step::Invoke(stage) => {
                if failure.is_some() {
                    continue;
                }
                if let Err(e) = execute_stage(tool, run, pipeline, stage) {
                    failure = Some(e);
                }
            }
            Step::Sweep { state, artifacts } => {
                if failure.is_some() {
                    if teardown == TeardownPolicy::OnSuccess {
                        continue;
                    }
                    info!("[{}] {} after failure", pipeline, state);
                } else {
                    run.enter_stage(format!("{}:{}", pipeline, state));
                    info!("[{}] {}", pipeline, state);
                }

                let mut janitor = ArtifactJanitor::new(tool);
                janitor.sweep(run, artifacts);
                report.merge(janitor.finish());
            }
        }
    }

    match failure {
        Some(e) => {
            if !report.is_clean() {
                warn!(
                    "[{}] {} cleanup warning(s) after failure",
                    pipeline,
                    report.warnings.len()
                );
            }
            Err(e)
        }
        None => Ok(report),
    }
}

//! Search pipelines
//!
//! Both pipelines are explicit state machines. A pipeline turns its plan into
//! a list of [`stage::Step`]s once, at construction, and hands them to the
//! shared executor in [`stage::run_steps`].

pub mod database;
pub mod janitor;
pub mod monomer;
pub mod pair;
pub mod params;
pub mod stage;
pub mod workspace;

pub use database::{DbHandle, IndexLayout, ReferenceDatabases, ReferenceDb};
pub use janitor::{Artifact, ArtifactJanitor, CleanupReport};
pub use monomer::{MonomerPipeline, MonomerStage};
pub use pair::{PairStage, PairingPipeline};
pub use params::{PairingStrategy, StageParameters};
pub use stage::{Stage, Step, TeardownPolicy};
pub use workspace::{PipelineRun, RunRecord, RunStatus};

use crate::tools::SearchTool;

/// Shared, read-only inputs of every pipeline in a run
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub tool: &'a dyn SearchTool,
    pub databases: &'a ReferenceDatabases,
    pub params: &'a StageParameters,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        tool: &'a dyn SearchTool,
        databases: &'a ReferenceDatabases,
        params: &'a StageParameters,
    ) -> Self {
        Self {
            tool,
            databases,
            params,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::config::{DatabaseSettings, StageToggles};
    use std::fs;
    use std::path::Path;

    pub const UNIREF: &str = "uniref30_2302_db";
    pub const TEMPLATES: &str = "pdb100_230517";
    pub const ENVDB: &str = "colabfold_envdb_202108_db";

    pub fn settings(toggles: StageToggles) -> DatabaseSettings {
        DatabaseSettings {
            template_db: TEMPLATES.to_string(),
            use_env: Some(toggles.use_env),
            use_templates: Some(toggles.use_templates),
            ..DatabaseSettings::default()
        }
    }

    /// Lay out every reference database under `dbbase`, indexed or not
    pub fn databases(dbbase: &Path, toggles: StageToggles, indexed: bool) -> ReferenceDatabases {
        for name in [UNIREF, TEMPLATES, ENVDB] {
            fs::write(dbbase.join(format!("{}.dbtype", name)), b"").unwrap();
            if indexed {
                fs::write(dbbase.join(format!("{}.idx", name)), b"").unwrap();
            }
        }
        ReferenceDatabases::resolve(dbbase, &settings(toggles), toggles).unwrap()
    }
}

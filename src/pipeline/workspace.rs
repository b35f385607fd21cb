//! Working directory of one search run
//!
//! Tracks which intermediate databases are currently live and keeps a small
//! `msa_run.json` record next to the outputs so a failed run can be inspected.

use crate::error::{SearchError, SearchResult};
use crate::pipeline::database::DbHandle;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const RECORD_FILE: &str = "msa_run.json";
pub const QUERY_FASTA: &str = "query.fas";
pub const QUERY_DB: &str = "qdb";
pub const QUERY_LOOKUP: &str = "qdb.lookup";
pub const TMP_DIR: &str = "tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Last stage entered, in `pipeline:STAGE` form
    pub current_stage: Option<String>,
    pub error_message: Option<String>,
    pub jobs: usize,
    pub sequences: usize,
}

#[derive(Debug)]
pub struct PipelineRun {
    root: PathBuf,
    live: IndexSet<DbHandle>,
    record: RunRecord,
}

impl PipelineRun {
    /// Create (or reuse) the run directory and write an initial record
    pub fn create(root: impl Into<PathBuf>) -> SearchResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let run = Self {
            root,
            live: IndexSet::new(),
            record: RunRecord {
                started_at: Utc::now(),
                finished_at: None,
                status: RunStatus::Active,
                current_stage: None,
                error_message: None,
                jobs: 0,
                sequences: 0,
            },
        };
        run.save_record()?;
        Ok(run)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Handle for an intermediate database inside the run directory
    pub fn db(&self, name: &str) -> DbHandle {
        DbHandle::new(self.root.join(name))
    }

    pub fn query_db(&self) -> DbHandle {
        self.db(QUERY_DB)
    }

    pub fn query_fasta(&self) -> PathBuf {
        self.path(QUERY_FASTA)
    }

    pub fn lookup_path(&self) -> PathBuf {
        self.path(QUERY_LOOKUP)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.path(TMP_DIR)
    }

    pub fn register(&mut self, db: DbHandle) {
        debug!("Database {} is live", db);
        self.live.insert(db);
    }

    pub fn retire(&mut self, db: &DbHandle) {
        if self.live.shift_remove(db) {
            debug!("Database {} retired", db);
        }
    }

    /// Registered by a completed stage, or already present on disk
    pub fn is_available(&self, db: &DbHandle) -> bool {
        self.live.contains(db) || db.exists()
    }

    pub fn live(&self) -> impl Iterator<Item = &DbHandle> {
        self.live.iter()
    }

    pub fn set_counts(&mut self, jobs: usize, sequences: usize) -> SearchResult<()> {
        self.record.jobs = jobs;
        self.record.sequences = sequences;
        self.save_record()
    }

    pub fn enter_stage(&mut self, stage: String) {
        self.record.current_stage = Some(stage);
        // Stage transitions only refresh the record opportunistically
        if let Err(e) = self.save_record() {
            warn!("Failed to update {}: {}", RECORD_FILE, e);
        }
    }

    pub fn mark_failed(&mut self, error: &SearchError) {
        self.record.status = RunStatus::Failed;
        self.record.error_message = Some(error.to_string());
        self.record.finished_at = Some(Utc::now());
        if let Err(e) = self.save_record() {
            warn!("Failed to record failure in {}: {}", RECORD_FILE, e);
        }
    }

    pub fn mark_completed(&mut self) -> SearchResult<()> {
        self.record.status = RunStatus::Completed;
        self.record.current_stage = None;
        self.record.finished_at = Some(Utc::now());
        self.save_record()
    }

    fn save_record(&self) -> SearchResult<()> {
        let json = serde_json::to_string_pretty(&self.record)?;
        fs::write(self.path(RECORD_FILE), json)?;
        Ok(())
    }
}

/// Read the record a previous run left in `root`
pub fn load_record(root: &Path) -> SearchResult<RunRecord> {
    let content = fs::read_to_string(root.join(RECORD_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_active_record() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out");
        let run = PipelineRun::create(&base).unwrap();

        assert!(base.is_dir());
        assert_eq!(run.query_fasta(), base.join("query.fas"));
        assert_eq!(run.query_db().path(), base.join("qdb"));
        assert_eq!(run.query_db().header().path(), base.join("qdb_h"));

        let record = load_record(&base).unwrap();
        assert_eq!(record.status, RunStatus::Active);
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn test_live_set_tracking() {
        let dir = TempDir::new().unwrap();
        let mut run = PipelineRun::create(dir.path()).unwrap();
        let res = run.db("res");
        let res_exp = run.db("res_exp");

        run.register(res.clone());
        run.register(res_exp.clone());
        assert!(run.is_available(&res));
        assert_eq!(run.live().count(), 2);

        run.retire(&res);
        assert!(!run.is_available(&res));
        assert_eq!(run.live().collect::<Vec<_>>(), vec![&res_exp]);
    }

    #[test]
    fn test_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let mut run = PipelineRun::create(dir.path()).unwrap();
        run.enter_stage("monomer:REALIGN".to_string());
        run.mark_failed(&SearchError::ToolFailure {
            command: "align".to_string(),
            exit_code: Some(1),
            stderr: "boom".to_string(),
        });

        let record = load_record(dir.path()).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.current_stage.as_deref(), Some("monomer:REALIGN"));
        assert!(record.error_message.unwrap().contains("align failed"));
    }

    #[test]
    fn test_completion_is_recorded() {
        let dir = TempDir::new().unwrap();
        let mut run = PipelineRun::create(dir.path()).unwrap();
        run.set_counts(2, 3).unwrap();
        run.mark_completed().unwrap();

        let record = load_record(dir.path()).unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!((record.jobs, record.sequences), (2, 3));
        assert!(record.finished_at.is_some());
    }
}

//! Artifact janitor: best-effort removal of intermediates
//!
//! Nothing here returns an error. Every failure becomes a [`CleanupWarning`]
//! in the [`CleanupReport`] and a `warn!` line in the log.

use crate::error::CleanupWarning;
use crate::pipeline::database::DbHandle;
use crate::pipeline::workspace::PipelineRun;
use crate::tools::{Invocation, SearchTool};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A temporary artifact a pipeline leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Removed through the engine's `rmdb`
    Database(DbHandle),
    Directory(PathBuf),
    File(PathBuf),
    /// Every file in the run directory whose name matches the pattern
    Files(String),
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn merge(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.warnings.extend(other.warnings);
    }
}

pub struct ArtifactJanitor<'a> {
    tool: &'a dyn SearchTool,
    report: CleanupReport,
}

impl<'a> ArtifactJanitor<'a> {
    pub fn new(tool: &'a dyn SearchTool) -> Self {
        Self {
            tool,
            report: CleanupReport::default(),
        }
    }

    /// Remove every artifact in order, collecting warnings
    pub fn sweep(&mut self, run: &mut PipelineRun, artifacts: &[Artifact]) {
        for artifact in artifacts {
            match artifact {
                Artifact::Database(db) => self.remove_database(run, db),
                Artifact::Directory(dir) => self.remove_dir(dir),
                Artifact::File(file) => self.remove_file(file),
                Artifact::Files(pattern) => self.remove_matching(run.root(), pattern),
            }
        }
    }

    /// `rmdb` a database; a database that is neither live nor on disk is skipped
    pub fn remove_database(&mut self, run: &mut PipelineRun, db: &DbHandle) {
        if !run.is_available(db) {
            debug!("Skipping removal of {}, not present", db);
            return;
        }

        if self.tool.execute_best_effort(&Invocation::new("rmdb").arg(db)) {
            run.retire(db);
            self.report.removed.push(db.path().to_path_buf());
        } else {
            self.warn(CleanupWarning::new(db.path(), "rmdb failed"));
        }
    }

    pub fn remove_dir(&mut self, dir: &Path) {
        if !dir.exists() {
            return;
        }
        match fs::remove_dir_all(dir) {
            Ok(()) => self.report.removed.push(dir.to_path_buf()),
            Err(e) => self.warn(CleanupWarning::new(dir, e.to_string())),
        }
    }

    pub fn remove_file(&mut self, file: &Path) {
        if !file.exists() {
            return;
        }
        match fs::remove_file(file) {
            Ok(()) => self.report.removed.push(file.to_path_buf()),
            Err(e) => self.warn(CleanupWarning::new(file, e.to_string())),
        }
    }

    /// Remove files in `root` whose names match a glob pattern such as `prof_res*`
    pub fn remove_matching(&mut self, root: &Path, pattern: &str) {
        let escaped = glob::Pattern::escape(&root.to_string_lossy());
        let full = Path::new(&escaped).join(pattern);
        let entries = match glob::glob(&full.to_string_lossy()) {
            Ok(entries) => entries,
            Err(e) => {
                self.warn(CleanupWarning::new(full, e.to_string()));
                return;
            }
        };

        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => self.remove_file(&path),
                Ok(_) => {}
                Err(e) => self.warn(CleanupWarning::new(e.path(), e.to_string())),
            }
        }
    }

    pub fn finish(self) -> CleanupReport {
        self.report
    }

    fn warn(&mut self, warning: CleanupWarning) {
        warn!("{}", warning);
        self.report.warnings.push(warning);
    }
}

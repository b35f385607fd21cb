//! MMseqs2 binary integration

use crate::error::{SearchError, SearchResult};
use crate::tools::traits::{Invocation, SearchTool};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Runs invocations against a local `mmseqs` binary
#[derive(Debug, Clone)]
pub struct MmseqsRunner {
    binary_path: PathBuf,
}

impl MmseqsRunner {
    /// Create a runner from a path or a bare binary name looked up on PATH
    pub fn new(binary: impl AsRef<Path>) -> SearchResult<Self> {
        let binary = binary.as_ref();

        let binary_path = if binary.components().count() > 1 {
            if !binary.exists() {
                return Err(SearchError::Configuration(format!(
                    "MMseqs2 binary not found at {}",
                    binary.display()
                )));
            }
            binary.to_path_buf()
        } else {
            which::which(binary).map_err(|e| {
                SearchError::Configuration(format!(
                    "MMseqs2 binary '{}' not found on PATH: {}",
                    binary.display(),
                    e
                ))
            })?
        };

        Ok(Self { binary_path })
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Ask the binary for its version string
    pub fn version(&self) -> SearchResult<String> {
        let output = Command::new(&self.binary_path).arg("version").output()?;
        if !output.status.success() {
            return Err(SearchError::ToolFailure {
                command: "version".to_string(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl SearchTool for MmseqsRunner {
    fn execute(&self, invocation: &Invocation) -> SearchResult<()> {
        info!("Running {} {}", self.binary_path.display(), invocation);

        let output = Command::new(&self.binary_path)
            .arg(&invocation.command)
            .args(&invocation.args)
            .output()
            .map_err(|e| SearchError::ToolFailure {
                command: invocation.command.clone(),
                exit_code: None,
                stderr: format!("failed to start {}: {}", self.binary_path.display(), e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} stdout:\n{}", invocation.command, stdout.trim_end());
        }

        if !output.status.success() {
            return Err(SearchError::ToolFailure {
                command: invocation.command.clone(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

//! Error types for msa-search

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for search pipeline operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The search engine exited non-zero (or could not be spawned)
    #[error("{command} failed with exit code {}: {stderr}", exit_code_display(.exit_code))]
    ToolFailure {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Result type alias for search pipeline operations
pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    /// A reference database named in the configuration has no `.dbtype` file
    pub fn missing_database(name: &str, dbtype: &std::path::Path) -> Self {
        SearchError::Configuration(format!(
            "Database {} does not exist (expected {})",
            name,
            dbtype.display()
        ))
    }

    pub fn is_tool_failure(&self) -> bool {
        matches!(self, SearchError::ToolFailure { .. })
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for SearchError {
    fn from(err: csv::Error) -> Self {
        SearchError::Parse(err.to_string())
    }
}

/// Failure to remove a best-effort intermediate.
///
/// Never returned as an `Err`: the deliverables already exist when these happen,
/// so they are logged and collected in a cleanup report instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub target: PathBuf,
    pub reason: String,
}

impl CleanupWarning {
    pub fn new(target: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not remove {}: {}",
            self.target.display(),
            self.reason
        )
    }
}

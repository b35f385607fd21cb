//! Traits for the external search engine

use crate::error::SearchResult;
use std::ffi::{OsStr, OsString};
use std::fmt;
use tracing::warn;

/// One engine call: a subcommand and its ordered arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Value following `flag`, if the flag is present
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Search engine capability consumed by the pipelines.
///
/// `execute` is the checked call: any non-zero exit comes back as
/// `SearchError::ToolFailure`. `execute_best_effort` is the unchecked call used
/// for removals whose failure must not abort a run.
pub trait SearchTool: Send + Sync {
    /// Run one invocation, failing on a non-zero exit
    fn execute(&self, invocation: &Invocation) -> SearchResult<()>;

    /// Run one invocation, logging instead of propagating a failure
    fn execute_best_effort(&self, invocation: &Invocation) -> bool {
        match self.execute(invocation) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring failure of '{}': {}", invocation, e);
                false
            }
        }
    }
}

impl<T: SearchTool + ?Sized> SearchTool for &T {
    fn execute(&self, invocation: &Invocation) -> SearchResult<()> {
        (**self).execute(invocation)
    }

    fn execute_best_effort(&self, invocation: &Invocation) -> bool {
        (**self).execute_best_effort(invocation)
    }
}

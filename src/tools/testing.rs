//! Recording search tool for tests and dry runs

use crate::error::{SearchError, SearchResult};
use crate::tools::traits::{Invocation, SearchTool};
use std::sync::Mutex;

/// Records every invocation and can be told to fail on given commands.
///
/// No files are touched, so it pairs with pipelines whose cleanup treats
/// missing databases as already removed.
#[derive(Debug, Default)]
pub struct RecordingTool {
    calls: Mutex<Vec<Invocation>>,
    fail_on: Vec<FailureRule>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    command: String,
    /// Fail on the n-th call of `command` (1-based)
    occurrence: usize,
    exit_code: i32,
}

impl RecordingTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first call of `command` with the given exit code
    pub fn failing_on(command: &str, exit_code: i32) -> Self {
        Self::failing_on_nth(command, 1, exit_code)
    }

    pub fn failing_on_nth(command: &str, occurrence: usize, exit_code: i32) -> Self {
        Self::failing_on_all(&[(command, occurrence, exit_code)])
    }

    /// Fail several calls at once, each rule as `(command, occurrence, exit_code)`
    pub fn failing_on_all(rules: &[(&str, usize, i32)]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: rules
                .iter()
                .map(|&(command, occurrence, exit_code)| FailureRule {
                    command: command.to_string(),
                    occurrence,
                    exit_code,
                })
                .collect(),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|i| i.command).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl SearchTool for RecordingTool {
    fn execute(&self, invocation: &Invocation) -> SearchResult<()> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| SearchError::Other("recording tool lock poisoned".to_string()))?;
        calls.push(invocation.clone());

        let seen = calls
            .iter()
            .filter(|c| c.command == invocation.command)
            .count();
        match self
            .fail_on
            .iter()
            .find(|r| r.command == invocation.command && r.occurrence == seen)
        {
            Some(rule) => Err(SearchError::ToolFailure {
                command: invocation.command.clone(),
                exit_code: Some(rule.exit_code),
                stderr: format!("simulated failure of {}", rule.command),
            }),
            None => Ok(()),
        }
    }
}

//! Task and run-mode types.
//!
//! A Task is the user's request plus the knobs that govern one Autopilot
//! (or dual-agent) run. It is immutable once the loop starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Which protocol drives the task: a single autopilot loop, or the
/// planner/executor handoff protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Single,
    Dual,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Single
    }
}

/// The user's request plus the execution knobs for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub initial_prompt: String,
    pub working_directory: PathBuf,
    #[serde(default = "Task::default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "Task::default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
    #[serde(default = "Task::default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
    #[serde(default)]
    pub backend_model_hint: Option<String>,
    #[serde(default)]
    pub allowed_toolset: Vec<String>,
    #[serde(default = "Task::default_continue_on_error")]
    pub continue_on_error: bool,
    #[serde(default = "Task::default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default)]
    pub mode: RunMode,
}

impl Task {
    fn default_max_iterations() -> u32 {
        10
    }

    fn default_per_call_timeout_ms() -> u64 {
        120_000
    }

    fn default_overall_timeout_ms() -> u64 {
        3_600_000
    }

    fn default_continue_on_error() -> bool {
        true
    }

    fn default_max_consecutive_errors() -> u32 {
        5
    }

    pub fn new(initial_prompt: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        debug!("Task::new: called");
        Self {
            initial_prompt: initial_prompt.into(),
            working_directory: working_directory.into(),
            max_iterations: Self::default_max_iterations(),
            per_call_timeout_ms: Self::default_per_call_timeout_ms(),
            overall_timeout_ms: Self::default_overall_timeout_ms(),
            backend_model_hint: None,
            allowed_toolset: Vec::new(),
            continue_on_error: Self::default_continue_on_error(),
            max_consecutive_errors: Self::default_max_consecutive_errors(),
            mode: RunMode::Single,
        }
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_per_call_timeout_ms(mut self, ms: u64) -> Self {
        self.per_call_timeout_ms = ms;
        self
    }

    pub fn with_overall_timeout_ms(mut self, ms: u64) -> Self {
        self.overall_timeout_ms = ms;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_max_consecutive_errors(mut self, n: u32) -> Self {
        self.max_consecutive_errors = n;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// Validation applied before a loop is allowed to start (Validation error kind).
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_prompt.trim().is_empty() {
            return Err("initialPrompt must not be empty".to_string());
        }
        if self.max_iterations < 1 || self.max_iterations > 100 {
            return Err("maxIterations must be in 1..=100".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_prompt() {
        let task = Task::new("", "/tmp");
        assert!(task.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_max_iterations() {
        let task = Task::new("do it", "/tmp").with_max_iterations(0);
        assert!(task.validate().is_err());
        let task = Task::new("do it", "/tmp").with_max_iterations(101);
        assert!(task.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_task() {
        let task = Task::new("do it", "/tmp").with_max_iterations(10);
        assert!(task.validate().is_ok());
    }
}

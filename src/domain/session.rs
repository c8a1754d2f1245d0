//! Session and Iteration records — the durable audit trail of one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::task::RunMode;

/// Terminal/non-terminal status of a Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl SessionStatus {
    /// Invariant 2 (spec.md §3): once non-Running, the status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Which role produced an Iteration. SINGLE mode only ever uses `Single`;
/// DUAL mode tags each iteration with the role that produced it so the same
/// AutopilotLoop engine can serve both (spec.md §9 "dynamic dispatch" note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Single,
    Planner,
    Executor,
}

/// Best-effort structured parse of a backend response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedArtifacts {
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub commands_run: Vec<String>,
    #[serde(default)]
    pub tools_invoked: Vec<String>,
    #[serde(default)]
    pub cost_estimate: Option<f64>,
}

/// One backend reply, as handed to the CompletionAnalyzer and journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub text: String,
    pub exit_status: i32,
    pub has_error: bool,
    #[serde(default)]
    pub parsed_artifacts: ParsedArtifacts,
    #[serde(default)]
    pub backend_session_token: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0 && !self.has_error
    }

    /// A synthetic Response for a backend call that never produced real
    /// output (spec.md §9 open question: failed calls ARE journaled).
    pub fn from_error(message: impl Into<String>) -> Self {
        debug!("Response::from_error: called");
        Self {
            text: message.into(),
            exit_status: -1,
            has_error: true,
            parsed_artifacts: ParsedArtifacts::default(),
            backend_session_token: None,
        }
    }
}

/// One backend call within a Session. Created-and-finalized atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub n: u32,
    pub prompt: String,
    pub response: Response,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub role: Role,
}

/// One execution of a Task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub mode: RunMode,
    pub working_directory: std::path::PathBuf,
    pub initial_prompt: String,
    #[serde(default)]
    pub iterations: Vec<Iteration>,
}

impl Session {
    pub fn new(
        initial_prompt: impl Into<String>,
        working_directory: impl Into<std::path::PathBuf>,
        mode: RunMode,
    ) -> Self {
        let session_id = Uuid::now_v7();
        debug!(%session_id, "Session::new: called");
        Self {
            session_id,
            started_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Running,
            mode,
            working_directory: working_directory.into(),
            initial_prompt: initial_prompt.into(),
            iterations: Vec::new(),
        }
    }

    /// Invariant 1: iterations are numbered 1..N with no gaps.
    pub fn next_iteration_number(&self) -> u32 {
        self.iterations.len() as u32 + 1
    }

    pub fn push_iteration(&mut self, iteration: Iteration) {
        debug!(session_id = %self.session_id, n = iteration.n, "Session::push_iteration: called");
        self.iterations.push(iteration);
    }

    pub fn close(&mut self, status: SessionStatus) {
        debug!(session_id = %self.session_id, ?status, "Session::close: called");
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn first_prompt_excerpt(&self, max_chars: usize) -> String {
        self.initial_prompt.chars().take(max_chars).collect()
    }
}

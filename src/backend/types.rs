//! Request/response/readiness types for the LLMBackend port.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::Response;

/// Options carried on one `Execute` call (spec.md §4.A).
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub model: Option<String>,
    pub work_dir: PathBuf,
    pub timeout: Duration,
    pub allowed_toolset: Vec<String>,
    pub resume_session_token: Option<String>,
}

impl ExecOpts {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            model: None,
            work_dir: work_dir.into(),
            timeout,
            allowed_toolset: Vec::new(),
            resume_session_token: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_resume_token(mut self, token: impl Into<String>) -> Self {
        self.resume_session_token = Some(token.into());
        self
    }
}

/// Result of `ProbeReadiness` (spec.md §4.A, §4.H).
#[derive(Debug, Clone, Default)]
pub struct ReadinessStatus {
    pub installed: bool,
    pub auth_ready: bool,
    pub issues: Vec<String>,
    pub can_proceed: bool,
    pub degraded: bool,
}

/// `Execute`'s success type is the shared domain `Response`.
pub type ExecResult = Response;

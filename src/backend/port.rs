//! The LLMBackend port (spec.md §4.A).
//!
//! Each call is independent: no conversation state is maintained in this
//! process between calls. Continuity across iterations is the backend's own
//! concern, threaded through `resume_session_token` (mirrors the "fresh
//! context every iteration" discipline the rest of the system relies on).

use async_trait::async_trait;

use super::error::BackendError;
use super::types::{ExecOpts, ExecResult, ReadinessStatus};

/// Abstract one-shot `Execute(prompt, opts) -> Response`, plus a readiness
/// probe used to gate loop start (spec.md §4.A, §4.H).
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// MUST be safe to call concurrently from different Sessions; the
    /// backend must not leak state between sessions except through the
    /// per-call `resume_session_token`. No ordering guarantee across
    /// parallel calls (spec.md §4.A contract).
    async fn execute(&self, prompt: &str, opts: &ExecOpts) -> Result<ExecResult, BackendError>;

    /// Classified, briefly cached by the caller (see `ReadinessProbe`).
    async fn probe_readiness(&self) -> Result<ReadinessStatus, BackendError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Seeded-response backend for unit tests, mirroring the teacher's
    /// `MockLlmClient` (seeded queue + atomic call counter).
    pub struct MockBackend {
        responses: Vec<Result<ExecResult, BackendError>>,
        call_count: AtomicUsize,
        readiness: ReadinessStatus,
    }

    impl MockBackend {
        pub fn new(responses: Vec<Result<ExecResult, BackendError>>) -> Self {
            debug!(response_count = %responses.len(), "MockBackend::new: called");
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                readiness: ReadinessStatus {
                    installed: true,
                    auth_ready: true,
                    issues: Vec::new(),
                    can_proceed: true,
                    degraded: false,
                },
            }
        }

        pub fn with_readiness(mut self, readiness: ReadinessStatus) -> Self {
            self.readiness = readiness;
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn execute(&self, _prompt: &str, _opts: &ExecOpts) -> Result<ExecResult, BackendError> {
            debug!("MockBackend::execute: called");
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Err(BackendError::BackendInternal("no more mock responses".to_string())))
        }

        async fn probe_readiness(&self) -> Result<ReadinessStatus, BackendError> {
            debug!("MockBackend::probe_readiness: called");
            Ok(self.readiness.clone())
        }
    }

    #[tokio::test]
    async fn mock_returns_seeded_responses_in_order() {
        use crate::domain::Response;

        let backend = MockBackend::new(vec![
            Ok(Response::from_error("first")),
            Ok(Response::from_error("second")),
        ]);
        let opts = ExecOpts::new("/tmp", std::time::Duration::from_secs(1));

        let r1 = backend.execute("p", &opts).await.unwrap();
        assert_eq!(r1.text, "first");
        let r2 = backend.execute("p", &opts).await.unwrap();
        assert_eq!(r2.text, "second");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn mock_errors_when_exhausted() {
        let backend = MockBackend::new(vec![]);
        let opts = ExecOpts::new("/tmp", std::time::Duration::from_secs(1));
        assert!(backend.execute("p", &opts).await.is_err());
    }
}

//! BackendError — the LLMBackend error taxonomy (spec.md §4.A, §7).

use std::time::Duration;
use thiserror::Error;

/// Errors an `LlmBackend::execute` or `probe_readiness` call can raise.
///
/// `Execute` fails with one of the named kinds; everything else collapses
/// into `BackendInternal` with the raw text preserved (spec.md §4.A contract).
#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("backend requires authentication")]
    AuthRequired,

    #[error("backend executable not found on PATH")]
    BackendNotInstalled,

    #[error("transient network failure: {0}")]
    Network(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend quota or rate limit exhausted")]
    QuotaExhausted,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("backend internal error: {0}")]
    BackendInternal(String),
}

impl BackendError {
    /// `Network`, `Timeout`, `BackendInternal` are recoverable locally
    /// under `continueOnError` (spec.md §7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Network(_) | BackendError::Timeout(_) | BackendError::BackendInternal(_)
        )
    }

    /// `AuthRequired`, `BackendNotInstalled`, `QuotaExhausted` (past retries)
    /// always surface as a terminal loop failure.
    pub fn is_always_surfaced(&self) -> bool {
        matches!(
            self,
            BackendError::AuthRequired | BackendError::BackendNotInstalled | BackendError::QuotaExhausted
        )
    }

    /// Precomputed per-kind guidance for the user-visible Result (spec.md §7).
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            BackendError::AuthRequired => "authenticate with the backend",
            BackendError::BackendNotInstalled => "install the backend and ensure it is on PATH",
            BackendError::Network(_) => "check network connectivity and retry",
            BackendError::Timeout(_) => "increase perCallTimeoutMs or simplify the task",
            BackendError::QuotaExhausted => "wait for quota to reset or upgrade the backend plan",
            BackendError::Transport(_) => "check the backend transport and retry",
            BackendError::BackendInternal(_) => "retry; if persistent, report to the backend maintainer",
        }
    }

    /// A short machine-stable kind name matching spec.md §7's table.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::AuthRequired => "AuthRequired",
            BackendError::BackendNotInstalled => "BackendNotInstalled",
            BackendError::Network(_) => "Network",
            BackendError::Timeout(_) => "Timeout",
            BackendError::QuotaExhausted => "QuotaExhausted",
            BackendError::Transport(_) => "Transport",
            BackendError::BackendInternal(_) => "BackendInternal",
        }
    }
}

//! SessionJournal actor commands and errors.

use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::{Iteration, RunMode, Session, SessionStatus};

/// Errors from journal operations (spec.md §4.B, §7).
#[derive(Debug, Error, Clone)]
pub enum JournalError {
    #[error("session not found: {0}")]
    NotFound(Uuid),

    /// Fatal without retry (spec.md §4.D failure semantics): an Append
    /// that cannot be flushed risks inconsistent on-disk state.
    #[error("journal I/O error: {0}")]
    JournalIO(String),

    /// Terminal: Append/Close after the session already closed.
    #[error("session is already closed")]
    JournalClosed,

    #[error("journal actor channel closed")]
    ChannelError,
}

pub type JournalResult<T> = Result<T, JournalError>;

/// Summary row returned by `List()` (spec.md §4.B).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub status: SessionStatus,
    pub first_prompt_excerpt: String,
}

#[derive(Debug)]
pub enum JournalCommand {
    Create {
        initial_prompt: String,
        working_directory: std::path::PathBuf,
        mode: RunMode,
        reply: oneshot::Sender<JournalResult<Uuid>>,
    },
    Append {
        session_id: Uuid,
        iteration: Iteration,
        reply: oneshot::Sender<JournalResult<()>>,
    },
    Close {
        session_id: Uuid,
        status: SessionStatus,
        reply: oneshot::Sender<JournalResult<()>>,
    },
    Load {
        session_id: Uuid,
        reply: oneshot::Sender<JournalResult<Session>>,
    },
    List {
        reply: oneshot::Sender<JournalResult<Vec<SessionSummary>>>,
    },
}

//! SessionJournal (spec.md §4.B) — durable, append-only record of one
//! Session's iterations. Single writer per Session; concurrent readers of
//! `load`/`list` are permitted (the actor serializes all access, so this is
//! automatic here rather than requiring a separate read path).

mod messages;
mod store;

pub use messages::{JournalCommand, JournalError, JournalResult, SessionSummary};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Iteration, RunMode, Session, SessionStatus};
use crate::hooks::HookBus;

const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Cheap-to-clone handle to the journal actor.
#[derive(Clone)]
pub struct SessionJournal {
    tx: mpsc::Sender<JournalCommand>,
}

impl SessionJournal {
    /// Spawn the journal actor, persisting one JSON file per session under
    /// `sessions_dir` and publishing `session_created`/`session_completed`
    /// HookEvents through `hook_bus`.
    pub fn spawn(sessions_dir: impl Into<PathBuf>, hook_bus: Arc<HookBus>) -> Self {
        let dir = sessions_dir.into();
        debug!(?dir, "SessionJournal::spawn: called");
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(store::actor_loop(dir, hook_bus, rx));
        Self { tx }
    }

    pub async fn create(
        &self,
        initial_prompt: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        mode: RunMode,
    ) -> JournalResult<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Create {
                initial_prompt: initial_prompt.into(),
                working_directory: working_directory.into(),
                mode,
                reply,
            })
            .await
            .map_err(|_| JournalError::ChannelError)?;
        rx.await.map_err(|_| JournalError::ChannelError)?
    }

    pub async fn append(&self, session_id: Uuid, iteration: Iteration) -> JournalResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Append {
                session_id,
                iteration,
                reply,
            })
            .await
            .map_err(|_| JournalError::ChannelError)?;
        rx.await.map_err(|_| JournalError::ChannelError)?
    }

    pub async fn close(&self, session_id: Uuid, status: SessionStatus) -> JournalResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Close { session_id, status, reply })
            .await
            .map_err(|_| JournalError::ChannelError)?;
        rx.await.map_err(|_| JournalError::ChannelError)?
    }

    pub async fn load(&self, session_id: Uuid) -> JournalResult<Session> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Load { session_id, reply })
            .await
            .map_err(|_| JournalError::ChannelError)?;
        rx.await.map_err(|_| JournalError::ChannelError)?
    }

    pub async fn list(&self) -> JournalResult<Vec<SessionSummary>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::List { reply })
            .await
            .map_err(|_| JournalError::ChannelError)?;
        rx.await.map_err(|_| JournalError::ChannelError)?
    }
}

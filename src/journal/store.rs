//! On-disk persistence and the journal actor loop.
//!
//! One JSON file per session (spec.md §6: "one top-level object per
//! Session"), written whole on every Append so `Load` always sees a
//! consistent snapshot. Grounded in the teacher's `StateManager` actor
//! (`td/src/state/manager.rs`): an mpsc command channel, a single owner of
//! the mutable state, oneshot replies.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{RunMode, Session, SessionStatus};
use crate::hooks::HookBus;

use super::messages::{JournalCommand, JournalError, JournalResult, SessionSummary};

fn session_path(dir: &Path, session_id: uuid::Uuid) -> PathBuf {
    dir.join(format!("{}.json", session_id))
}

fn write_session(dir: &Path, session: &Session) -> JournalResult<()> {
    let path = session_path(dir, session.session_id);
    let json = serde_json::to_string_pretty(session).map_err(|e| JournalError::JournalIO(e.to_string()))?;
    // Write to a temp file and rename, so a crash mid-write never leaves a
    // half-written session file (Append must return only after flush).
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(|e| JournalError::JournalIO(e.to_string()))?;
    fs::rename(&tmp_path, &path).map_err(|e| JournalError::JournalIO(e.to_string()))?;
    Ok(())
}

fn read_session(dir: &Path, session_id: uuid::Uuid) -> JournalResult<Session> {
    let path = session_path(dir, session_id);
    let contents = fs::read_to_string(&path).map_err(|_| JournalError::NotFound(session_id))?;
    serde_json::from_str(&contents).map_err(|e| JournalError::JournalIO(e.to_string()))
}

/// Session ids for every `<uuid>.json` file under `dir`, skipping the
/// `.json.tmp` write-in-progress files `write_session` leaves behind on a
/// crash between `write` and `rename`.
fn disk_session_ids(dir: &Path) -> Vec<uuid::Uuid> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(?dir, error = %e, "journal::disk_session_ids: failed to read sessions directory");
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                return None;
            }
            path.file_stem()?.to_str()?.parse::<uuid::Uuid>().ok()
        })
        .collect()
}

pub(super) async fn actor_loop(dir: PathBuf, hook_bus: std::sync::Arc<HookBus>, mut rx: mpsc::Receiver<JournalCommand>) {
    debug!(?dir, "journal::actor_loop: started");

    if let Err(e) = fs::create_dir_all(&dir) {
        warn!(error = %e, "journal::actor_loop: failed to create sessions directory");
    }

    let mut sessions: HashMap<uuid::Uuid, Session> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Create {
                initial_prompt,
                working_directory,
                mode,
                reply,
            } => {
                debug!("journal::actor_loop: Create command");
                let session = Session::new(initial_prompt, working_directory, mode);
                let session_id = session.session_id;
                let result = write_session(&dir, &session).map(|_| {
                    sessions.insert(session_id, session.clone());
                    session_id
                });
                if result.is_ok() {
                    hook_bus
                        .emitter_for(session_id)
                        .session_created(mode_label(mode), &session.initial_prompt);
                }
                let _ = reply.send(result);
            }

            JournalCommand::Append {
                session_id,
                iteration,
                reply,
            } => {
                debug!(%session_id, n = iteration.n, "journal::actor_loop: Append command");
                let result = match sessions.get_mut(&session_id) {
                    None => Err(JournalError::NotFound(session_id)),
                    Some(session) if session.status.is_terminal() => Err(JournalError::JournalClosed),
                    Some(session) => {
                        session.push_iteration(iteration);
                        write_session(&dir, session)
                    }
                };
                let _ = reply.send(result);
            }

            JournalCommand::Close { session_id, status, reply } => {
                debug!(%session_id, ?status, "journal::actor_loop: Close command");
                let result = match sessions.get_mut(&session_id) {
                    None => Err(JournalError::NotFound(session_id)),
                    Some(session) if session.status.is_terminal() => Err(JournalError::JournalClosed),
                    Some(session) => {
                        session.close(status);
                        write_session(&dir, session)
                    }
                };
                if result.is_ok() {
                    if let Some(session) = sessions.get(&session_id) {
                        hook_bus.emitter_for(session_id).session_completed(
                            status_label(status),
                            session.iterations.len() as u32,
                            None,
                        );
                    }
                }
                let _ = reply.send(result);
            }

            JournalCommand::Load { session_id, reply } => {
                debug!(%session_id, "journal::actor_loop: Load command");
                let result = sessions
                    .get(&session_id)
                    .cloned()
                    .map(Ok)
                    .unwrap_or_else(|| read_session(&dir, session_id));
                let _ = reply.send(result);
            }

            JournalCommand::List { reply } => {
                debug!("journal::actor_loop: List command");
                // List() must reflect durable state (spec.md §6), not just
                // this actor's in-memory map, which starts empty on every
                // fresh process and only gains entries it has itself
                // Create()d. Union the in-memory sessions with every
                // session file on disk, preferring the in-memory copy
                // where both exist since it may be ahead of what was last
                // flushed.
                let mut summaries: Vec<SessionSummary> = sessions
                    .values()
                    .map(|s| SessionSummary {
                        session_id: s.session_id,
                        started_at: s.started_at,
                        status: s.status,
                        first_prompt_excerpt: s.first_prompt_excerpt(120),
                    })
                    .collect();
                for session_id in disk_session_ids(&dir) {
                    if sessions.contains_key(&session_id) {
                        continue;
                    }
                    if let Ok(session) = read_session(&dir, session_id) {
                        summaries.push(SessionSummary {
                            session_id: session.session_id,
                            started_at: session.started_at,
                            status: session.status,
                            first_prompt_excerpt: session.first_prompt_excerpt(120),
                        });
                    }
                }
                let _ = reply.send(Ok(summaries));
            }
        }
    }

    debug!("journal::actor_loop: channel closed, exiting");
}

fn mode_label(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Single => "SINGLE",
        RunMode::Dual => "DUAL",
    }
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Running => "RUNNING",
        SessionStatus::Completed => "COMPLETED",
        SessionStatus::Failed => "FAILED",
        SessionStatus::Aborted => "ABORTED",
    }
}

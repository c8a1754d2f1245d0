//! Optional JSONL event sink — HookEvents are ephemeral by design (spec.md
//! §3: "persisted only if the journal's event sink is enabled"). Grounded
//! in the teacher's `EventLogger` (`td/src/events/logger.rs`): one JSONL
//! file per session under a runs directory, opened lazily and kept open.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

use crate::domain::HookEvent;

use super::bus::HookBus;

pub struct HookEventLogger {
    runs_dir: PathBuf,
    writers: HashMap<Uuid, BufWriter<File>>,
}

impl HookEventLogger {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        Self {
            runs_dir: runs_dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
        }
    }

    pub fn write_event(&mut self, event: &HookEvent) -> std::io::Result<()> {
        debug!(session_id = %event.session_id, "HookEventLogger::write_event: called");

        if !self.writers.contains_key(&event.session_id) {
            let dir = self.runs_dir.join(event.session_id.to_string());
            fs::create_dir_all(&dir)?;
            let path = dir.join("events.jsonl");
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.writers.insert(event.session_id, BufWriter::new(file));
        }

        let writer = self.writers.get_mut(&event.session_id).expect("inserted above");
        let line = serde_json::to_string(event)?;
        writeln!(writer, "{}", line)?;
        writer.flush()
    }
}

/// Spawn a background task that subscribes to `bus` and persists every
/// event to JSONL until the bus is dropped.
pub fn spawn_event_logger(bus: &HookBus, runs_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let mut rx: broadcast::Receiver<HookEvent> = bus.subscribe();
    let mut logger = HookEventLogger::new(runs_dir);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = logger.write_event(&event) {
                        error!(error = %e, "spawn_event_logger: failed to persist event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "spawn_event_logger: lagged, some events not persisted");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

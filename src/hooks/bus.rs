//! HookBus (spec.md §4.F) — in-process fan-out of the closed HookEvent
//! taxonomy. `publish` is synchronous with the caller's state transition:
//! the underlying broadcast channel copies the event into every
//! subscriber's buffer before returning, satisfying invariant 4 (spec.md
//! §3) without the publisher ever waiting on a slow subscriber.
//!
//! Generalizes the teacher's `EventBus`/`EventEmitter`
//! (`td/src/events/bus.rs`) from an open ad-hoc event enum to the spec's
//! closed six-type-plus-admission taxonomy.

use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{HandoffRecord, HookEvent, HookEventType};

/// Buffered events before a lagging subscriber starts missing them.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central typed event bus. Every B/D/E (Journal/AutopilotLoop/Coordinator)
/// transition publishes exactly one event here before returning.
pub struct HookBus {
    tx: broadcast::Sender<HookEvent>,
}

impl HookBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "HookBus::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HookEvent> {
        debug!("HookBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, event: HookEvent) {
        debug!(event_type = ?event.event_type, session_id = %event.session_id, "HookBus::publish: called");
        // No persistence by design (spec.md §4.F): dropping on zero
        // subscribers is fine, the journal is the source of truth.
        let _ = self.tx.send(event);
    }

    pub fn emitter_for(&self, session_id: Uuid) -> HookEmitter {
        HookEmitter {
            tx: self.tx.clone(),
            session_id,
        }
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Cheap-to-clone handle bound to one Session, with a convenience method
/// per closed event type.
#[derive(Clone)]
pub struct HookEmitter {
    tx: broadcast::Sender<HookEvent>,
    session_id: Uuid,
}

impl HookEmitter {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn emit(&self, event_type: HookEventType, payload: serde_json::Value) {
        let event = HookEvent::new(event_type, self.session_id, payload);
        debug!(event_type = ?event.event_type, "HookEmitter::emit");
        let _ = self.tx.send(event);
    }

    pub fn session_created(&self, mode: &str, initial_prompt: &str) {
        self.emit(
            HookEventType::SessionCreated,
            json!({ "mode": mode, "initialPromptExcerpt": initial_prompt.chars().take(200).collect::<String>() }),
        );
    }

    pub fn session_completed(&self, status: &str, iteration_count: u32, quality_score: Option<f64>) {
        self.emit(
            HookEventType::SessionCompleted,
            json!({ "status": status, "iterations": iteration_count, "qualityScore": quality_score }),
        );
    }

    pub fn iteration_started(&self, n: u32, role: &str) {
        self.emit(HookEventType::IterationStarted, json!({ "n": n, "role": role }));
    }

    pub fn iteration_completed(&self, n: u32, role: &str, is_complete: bool, confidence: f64) {
        self.emit(
            HookEventType::IterationCompleted,
            json!({ "n": n, "role": role, "isComplete": is_complete, "confidence": confidence }),
        );
    }

    pub fn handoff(&self, record: &HandoffRecord) {
        self.emit(HookEventType::Handoff, serde_json::to_value(record).unwrap_or(json!({})));
    }

    pub fn analyzer_verdict(&self, n: u32, confidence: f64, quality_score: f64) {
        self.emit(
            HookEventType::AnalyzerVerdict,
            json!({ "n": n, "confidence": confidence, "qualityScore": quality_score }),
        );
    }

    pub fn backend_error(&self, kind: &str, message: &str) {
        self.emit(HookEventType::BackendError, json!({ "kind": kind, "message": message }));
    }

    pub fn backend_auth_required(&self) {
        self.emit(HookEventType::BackendAuthRequired, json!({}));
    }

    pub fn observer_admitted(&self, connection_id: Uuid) {
        self.emit(HookEventType::ObserverAdmitted, json!({ "connectionId": connection_id }));
    }

    pub fn observer_dropped(&self, connection_id: Uuid, reason: &str) {
        self.emit(
            HookEventType::ObserverDropped,
            json!({ "connectionId": connection_id, "reason": reason }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers_in_order() {
        let bus = HookBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let session_id = Uuid::now_v7();
        let emitter = bus.emitter_for(session_id);

        emitter.session_created("SINGLE", "do it");
        emitter.iteration_started(1, "SINGLE");

        let e1a = rx1.recv().await.unwrap();
        let e1b = rx1.recv().await.unwrap();
        let e2a = rx2.recv().await.unwrap();
        let e2b = rx2.recv().await.unwrap();

        assert_eq!(e1a.event_type, HookEventType::SessionCreated);
        assert_eq!(e1b.event_type, HookEventType::IterationStarted);
        assert_eq!(e2a.event_type, HookEventType::SessionCreated);
        assert_eq!(e2b.event_type, HookEventType::IterationStarted);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = HookBus::new(16);
        let emitter = bus.emitter_for(Uuid::now_v7());
        emitter.session_created("SINGLE", "do it");
    }
}

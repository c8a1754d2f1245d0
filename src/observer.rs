//! ObserverSessionPool (spec.md §4.G) — the bounded pool of long-lived
//! observer channels that fan HookEvents out to dashboards, with admission,
//! backpressure, health tracking and reconnection.
//!
//! No direct teacher analog covers the full state machine; the admission
//! handshake and handle shape are grounded on the teacher's
//! `coordinator/handle.rs` (`mpsc::Sender` request side, cloneable handle,
//! `tracing::debug!` at every call entry) and the per-subscriber fan-out on
//! `events/bus.rs`. The bounded-queue-with-custom-drop-policy backpressure
//! and the reconnect-by-seq ring have no teacher equivalent and are authored
//! fresh against tokio `sync::{Mutex, Notify}`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{HookEvent, HookEventType, ObserverSession, ObserverState, SubscriptionFilter};
use crate::hooks::HookBus;
use crate::journal::SessionJournal;

/// How many consecutive missed heartbeats before a session is marked UNHEALTHY.
const HEARTBEAT_MISS_THRESHOLD: u32 = 3;
/// How many dropped/coalesced deliveries within a session's lifetime before
/// it is marked UNHEALTHY (spec.md §4.G backpressure policy).
const DROP_UNHEALTHY_THRESHOLD: u64 = 20;

/// Request to join the observer plane.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub origin: String,
    pub auth_token: Option<String>,
    pub protocol_version: u32,
    pub subscription_filter: SubscriptionFilter,
    /// `Some((connectionId, lastSeenEventSeq))` when resuming a prior connection.
    pub reconnect: Option<(Uuid, u64)>,
}

/// The protocol version this pool speaks; a mismatched caller is refused
/// with `ProtocolMismatch` before any state is allocated.
pub const PROTOCOL_VERSION: u32 = 1;

/// Why an admission attempt was refused (spec.md §4.G admission policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionRejection {
    OverCapacity,
    OriginDenied,
    AuthFailed,
    ProtocolMismatch,
}

impl AdmissionRejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            AdmissionRejection::OverCapacity => "over_capacity",
            AdmissionRejection::OriginDenied => "origin_denied",
            AdmissionRejection::AuthFailed => "auth_failed",
            AdmissionRejection::ProtocolMismatch => "protocol_mismatch",
        }
    }
}

fn is_coalescible(event_type: HookEventType) -> bool {
    matches!(
        event_type,
        HookEventType::IterationStarted | HookEventType::IterationCompleted | HookEventType::AnalyzerVerdict
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnqueueOutcome {
    Enqueued,
    Coalesced,
    DroppedOldest,
}

/// Bounded outbound queue for one observer. Publishers use `push`, which
/// never blocks: a full queue applies the drop policy instead of waiting.
struct ObserverOutbox {
    queue: Mutex<VecDeque<HookEvent>>,
    notify: Notify,
    capacity: usize,
}

impl ObserverOutbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    async fn push(&self, event: HookEvent) -> EnqueueOutcome {
        let mut queue = self.queue.lock().await;
        if queue.len() < self.capacity {
            queue.push_back(event);
            drop(queue);
            self.notify.notify_one();
            return EnqueueOutcome::Enqueued;
        }

        if is_coalescible(event.event_type) {
            if let Some(slot) = queue
                .iter_mut()
                .rev()
                .find(|queued| queued.event_type == event.event_type && queued.session_id == event.session_id)
            {
                *slot = event;
                drop(queue);
                self.notify.notify_one();
                return EnqueueOutcome::Coalesced;
            }
        }

        queue.pop_front();
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
        EnqueueOutcome::DroppedOldest
    }

    async fn recv(&self) -> HookEvent {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock().await;
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            notified.await;
        }
    }

    async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

struct ObserverSlot {
    session: Arc<RwLock<ObserverSession>>,
    outbox: Arc<ObserverOutbox>,
}

/// Handle returned to the caller on successful admission. Wraps the
/// connection's outbound queue; `recv` is how the transport layer (out of
/// scope per spec.md §1) would pull events to forward to the real observer.
pub struct ObserverHandle {
    connection_id: Uuid,
    outbox: Arc<ObserverOutbox>,
    session: Arc<RwLock<ObserverSession>>,
}

impl ObserverHandle {
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub async fn recv(&self) -> HookEvent {
        let event = self.outbox.recv().await;
        let mut record = self.session.write().await;
        record.state = ObserverState::Active;
        record.touch();
        event
    }

    pub async fn state(&self) -> ObserverState {
        self.session.read().await.state
    }
}

struct RingEntry {
    seq: u64,
    event: HookEvent,
}

/// The bounded pool itself. Cheap to clone: every field is an `Arc`, so a
/// clone can be moved into the fan-out task spawned by `spawn_fanout`.
#[derive(Clone)]
pub struct ObserverSessionPool {
    hooks: Arc<HookBus>,
    journal: SessionJournal,
    config: Arc<crate::config::PoolConfig>,
    sessions: Arc<RwLock<HashMap<Uuid, ObserverSlot>>>,
    ring: Arc<Mutex<VecDeque<RingEntry>>>,
    next_seq: Arc<AtomicU64>,
    ring_capacity: usize,
}

impl ObserverSessionPool {
    pub fn new(hooks: Arc<HookBus>, journal: SessionJournal, config: crate::config::PoolConfig) -> Self {
        let ring_capacity = config.outbound_queue_capacity.saturating_mul(8).max(256);
        debug!(ring_capacity, "ObserverSessionPool::new: called");
        Self {
            hooks,
            journal,
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ring: Arc::new(Mutex::new(VecDeque::new())),
            next_seq: Arc::new(AtomicU64::new(1)),
            ring_capacity,
        }
    }

    /// Subscribe to the HookBus (synchronously, so no publish between this
    /// call and task start can be missed) and spawn the fan-out loop.
    pub fn spawn_fanout(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.hooks.subscribe();
        tokio::spawn(self.clone().run_fanout(rx))
    }

    async fn run_fanout(self, mut rx: broadcast::Receiver<HookEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.fan_out_one(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ObserverSessionPool::run_fanout: subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("ObserverSessionPool::run_fanout: bus closed, exiting");
                    break;
                }
            }
        }
    }

    async fn fan_out_one(&self, event: HookEvent) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut ring = self.ring.lock().await;
            ring.push_back(RingEntry { seq, event: event.clone() });
            while ring.len() > self.ring_capacity {
                ring.pop_front();
            }
        }

        let sessions = self.sessions.read().await;
        for (connection_id, slot) in sessions.iter() {
            let eligible = {
                let record = slot.session.read().await;
                !record.state.is_terminal()
                    && record.subscription_filter.matches_session(event.session_id)
                    && record.subscription_filter.matches_event_type(event.event_type)
            };
            if !eligible {
                continue;
            }

            let outcome = slot.outbox.push(event.clone()).await;
            let mut record = slot.session.write().await;
            record.last_seen_event_seq = seq;
            if outcome != EnqueueOutcome::Enqueued {
                record.dropped_events += 1;
                if record.dropped_events >= DROP_UNHEALTHY_THRESHOLD
                    && matches!(record.state, ObserverState::Ready | ObserverState::Active | ObserverState::Idle)
                {
                    warn!(%connection_id, dropped = record.dropped_events, "observer crossed drop threshold, marking unhealthy");
                    record.state = ObserverState::Unhealthy;
                }
            }
        }
    }

    /// Run the admission handshake and, on success, register the session
    /// and return a handle to its outbound queue.
    pub async fn admit(&self, req: AdmissionRequest) -> Result<ObserverHandle, AdmissionRejection> {
        debug!(origin = %req.origin, "ObserverSessionPool::admit: called");

        if !self.config.origin_allowlist.is_empty() && !self.config.origin_allowlist.iter().any(|o| o == &req.origin) {
            return Err(AdmissionRejection::OriginDenied);
        }
        if req.protocol_version != PROTOCOL_VERSION {
            return Err(AdmissionRejection::ProtocolMismatch);
        }
        if req.auth_token.as_deref().unwrap_or("").is_empty() {
            return Err(AdmissionRejection::AuthFailed);
        }
        {
            let sessions = self.sessions.read().await;
            if sessions.len() >= self.config.max_connections {
                return Err(AdmissionRejection::OverCapacity);
            }
        }

        let connection_id = req.reconnect.map(|(id, _)| id).unwrap_or_else(Uuid::now_v7);
        let mut record = ObserverSession::new(connection_id, req.subscription_filter.clone());
        let outbox = Arc::new(ObserverOutbox::new(self.config.outbound_queue_capacity));

        if let Some((_, last_seen_seq)) = req.reconnect {
            let replayed_from_ring = self.replay_from_ring(&req.subscription_filter, last_seen_seq, &outbox).await;
            if !replayed_from_ring {
                debug!(%connection_id, "admit: reconnect beyond ring, resyncing from journal");
                self.backfill(&req.subscription_filter, &outbox).await;
            }
            record.last_seen_event_seq = last_seen_seq;
        } else if self.config.enable_backfill {
            self.backfill(&req.subscription_filter, &outbox).await;
        }

        record.state = ObserverState::Ready;
        let session = Arc::new(RwLock::new(record));
        self.sessions.write().await.insert(
            connection_id,
            ObserverSlot {
                session: session.clone(),
                outbox: outbox.clone(),
            },
        );

        self.hooks.emitter_for(connection_id).observer_admitted(connection_id);

        Ok(ObserverHandle {
            connection_id,
            outbox,
            session,
        })
    }

    /// Replay ring entries newer than `from_seq`. Returns `false` if
    /// `from_seq` predates the ring's oldest retained entry, signalling the
    /// caller should fall back to a journal resync.
    async fn replay_from_ring(&self, filter: &SubscriptionFilter, from_seq: u64, outbox: &ObserverOutbox) -> bool {
        let ring = self.ring.lock().await;
        let within_ring = match ring.front() {
            Some(oldest) => from_seq + 1 >= oldest.seq,
            None => true,
        };
        if !within_ring {
            return false;
        }
        for entry in ring.iter() {
            if entry.seq > from_seq
                && filter.matches_session(entry.event.session_id)
                && filter.matches_event_type(entry.event.event_type)
            {
                let _ = outbox.push(entry.event.clone()).await;
            }
        }
        true
    }

    /// Replay the last `backfillCount` iterations per subscribed session
    /// from the journal (the source of truth once the ring has rolled over).
    async fn backfill(&self, filter: &SubscriptionFilter, outbox: &ObserverOutbox) {
        let Some(session_ids) = filter.session_ids.as_ref() else {
            // "*" subscriptions have no concrete session to replay from.
            return;
        };
        for &session_id in session_ids {
            let Ok(session) = self.journal.load(session_id).await else {
                continue;
            };
            let start = session.iterations.len().saturating_sub(self.config.backfill_count);
            for iteration in &session.iterations[start..] {
                let payload = json!({
                    "n": iteration.n,
                    "role": format!("{:?}", iteration.role),
                    "backfill": true,
                });
                let _ = outbox.push(HookEvent::new(HookEventType::IterationCompleted, session_id, payload)).await;
            }
        }
    }

    /// Record a heartbeat outcome. A missed response beyond the threshold
    /// marks UNHEALTHY; a success clears the miss counter and, if the
    /// session was UNHEALTHY or RECOVERING, restores it to READY.
    pub async fn record_heartbeat(&self, connection_id: Uuid, responded: bool) -> bool {
        let sessions = self.sessions.read().await;
        let Some(slot) = sessions.get(&connection_id) else {
            return false;
        };
        let mut record = slot.session.write().await;
        if responded {
            record.missed_heartbeats = 0;
            record.touch();
            if matches!(record.state, ObserverState::Unhealthy | ObserverState::Recovering) {
                record.state = ObserverState::Ready;
            }
        } else {
            record.missed_heartbeats += 1;
            if record.missed_heartbeats >= HEARTBEAT_MISS_THRESHOLD && !record.state.is_terminal() {
                record.state = ObserverState::Unhealthy;
            }
        }
        true
    }

    /// Bounded recovery attempt for an UNHEALTHY session: if its outbound
    /// queue has drained, call it restored; otherwise send it to RECYCLING.
    pub async fn attempt_recovery(&self, connection_id: Uuid) -> Option<ObserverState> {
        let sessions = self.sessions.read().await;
        let slot = sessions.get(&connection_id)?;
        {
            let state = slot.session.read().await.state;
            if state != ObserverState::Unhealthy {
                return Some(state);
            }
        }
        {
            let mut record = slot.session.write().await;
            record.state = ObserverState::Recovering;
        }
        let drained = slot.outbox.len().await == 0;
        let mut record = slot.session.write().await;
        record.state = if drained { ObserverState::Ready } else { ObserverState::Recycling };
        record.missed_heartbeats = 0;
        Some(record.state)
    }

    /// Periodic maintenance: ages RECYCLING sessions to CLOSED (removing
    /// them from the pool), promotes stale connections to RECYCLING past
    /// `connectionTtl`, and marks long-inactive ACTIVE sessions IDLE.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let mut closed = Vec::new();

        {
            let sessions = self.sessions.write().await;
            for (connection_id, slot) in sessions.iter() {
                let mut record = slot.session.write().await;
                if record.state.is_terminal() {
                    continue;
                }
                if record.state == ObserverState::Recycling {
                    record.state = ObserverState::Closed;
                    closed.push(*connection_id);
                    continue;
                }
                let age_ms = (now - record.acquired_at).num_milliseconds().max(0) as u64;
                let idle_ms = (now - record.last_activity_at).num_milliseconds().max(0) as u64;
                if age_ms > self.config.connection_ttl_ms {
                    record.state = ObserverState::Recycling;
                } else if idle_ms > self.config.idle_timeout_ms && record.state == ObserverState::Active {
                    record.state = ObserverState::Idle;
                }
            }
        }

        if closed.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write().await;
        for connection_id in &closed {
            sessions.remove(connection_id);
        }
        drop(sessions);
        for connection_id in closed {
            self.hooks.emitter_for(connection_id).observer_dropped(connection_id, "recycled");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_state(&self, connection_id: Uuid) -> Option<ObserverState> {
        let sessions = self.sessions.read().await;
        let slot = sessions.get(&connection_id)?;
        Some(slot.session.read().await.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use tempfile::TempDir;

    fn request(origin: &str, filter: SubscriptionFilter) -> AdmissionRequest {
        AdmissionRequest {
            origin: origin.to_string(),
            auth_token: Some("tok".to_string()),
            protocol_version: PROTOCOL_VERSION,
            subscription_filter: filter,
            reconnect: None,
        }
    }

    fn new_pool(config: PoolConfig) -> (ObserverSessionPool, Arc<HookBus>, TempDir) {
        let dir = TempDir::new().unwrap();
        let hooks = Arc::new(HookBus::new(256));
        let journal = SessionJournal::spawn(dir.path(), hooks.clone());
        (ObserverSessionPool::new(hooks.clone(), journal, config), hooks, dir)
    }

    #[tokio::test]
    async fn admits_within_capacity_and_delivers_published_events() {
        let (pool, hooks, _dir) = new_pool(PoolConfig::default());
        let handle = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();
        assert_eq!(pool.session_count().await, 1);

        let session_id = Uuid::now_v7();
        pool.spawn_fanout();
        hooks.emitter_for(session_id).session_created("SINGLE", "do it");

        let event = handle.recv().await;
        assert_eq!(event.event_type, HookEventType::SessionCreated);
        assert_eq!(handle.state().await, ObserverState::Active);
    }

    #[tokio::test]
    async fn rejects_over_capacity() {
        let mut config = PoolConfig::default();
        config.max_connections = 1;
        let (pool, _hooks, _dir) = new_pool(config);

        pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();
        let rejection = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap_err();
        assert_eq!(rejection, AdmissionRejection::OverCapacity);
        assert_eq!(rejection.reason_code(), "over_capacity");
    }

    #[tokio::test]
    async fn rejects_disallowed_origin() {
        let mut config = PoolConfig::default();
        config.origin_allowlist = vec!["https://allowed".to_string()];
        let (pool, _hooks, _dir) = new_pool(config);

        let rejection = pool.admit(request("https://evil", SubscriptionFilter::default())).await.unwrap_err();
        assert_eq!(rejection, AdmissionRejection::OriginDenied);

        let accepted = pool.admit(request("https://allowed", SubscriptionFilter::default())).await;
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn rejects_missing_auth_token() {
        let (pool, _hooks, _dir) = new_pool(PoolConfig::default());
        let mut req = request("https://dash", SubscriptionFilter::default());
        req.auth_token = None;
        let rejection = pool.admit(req).await.unwrap_err();
        assert_eq!(rejection, AdmissionRejection::AuthFailed);
    }

    #[tokio::test]
    async fn rejects_protocol_mismatch() {
        let (pool, _hooks, _dir) = new_pool(PoolConfig::default());
        let mut req = request("https://dash", SubscriptionFilter::default());
        req.protocol_version = PROTOCOL_VERSION + 1;
        let rejection = pool.admit(req).await.unwrap_err();
        assert_eq!(rejection, AdmissionRejection::ProtocolMismatch);
    }

    #[tokio::test]
    async fn full_queue_coalesces_iteration_completed_events() {
        let mut config = PoolConfig::default();
        config.outbound_queue_capacity = 1;
        let (pool, hooks, _dir) = new_pool(config);
        let handle = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();

        let session_id = Uuid::now_v7();
        let emitter = hooks.emitter_for(session_id);
        pool.fan_out_one(HookEvent::new(HookEventType::IterationCompleted, session_id, json!({ "n": 1 })))
            .await;
        pool.fan_out_one(HookEvent::new(HookEventType::IterationCompleted, session_id, json!({ "n": 2 })))
            .await;
        let _ = &emitter;

        assert_eq!(pool.session_state(handle.connection_id()).await, Some(ObserverState::Ready));
        let event = handle.recv().await;
        assert_eq!(event.payload["n"], 2);
    }

    #[tokio::test]
    async fn drop_threshold_marks_session_unhealthy() {
        let mut config = PoolConfig::default();
        config.outbound_queue_capacity = 1;
        let (pool, _hooks, _dir) = new_pool(config);
        let handle = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();
        let session_id = Uuid::now_v7();

        // One event fills the queue; every further publish without a drain
        // counts as a drop (coalesce, since these are all IterationCompleted).
        for n in 0..(DROP_UNHEALTHY_THRESHOLD + 2) {
            pool.fan_out_one(HookEvent::new(HookEventType::IterationCompleted, session_id, json!({ "n": n })))
                .await;
        }

        assert_eq!(pool.session_state(handle.connection_id()).await, Some(ObserverState::Unhealthy));
    }

    #[tokio::test]
    async fn heartbeat_miss_threshold_marks_unhealthy_then_recovers() {
        let (pool, _hooks, _dir) = new_pool(PoolConfig::default());
        let handle = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();
        let connection_id = handle.connection_id();

        for _ in 0..HEARTBEAT_MISS_THRESHOLD {
            pool.record_heartbeat(connection_id, false).await;
        }
        assert_eq!(pool.session_state(connection_id).await, Some(ObserverState::Unhealthy));

        pool.record_heartbeat(connection_id, true).await;
        assert_eq!(pool.session_state(connection_id).await, Some(ObserverState::Ready));
    }

    #[tokio::test]
    async fn recovery_recycles_when_queue_has_not_drained() {
        let mut config = PoolConfig::default();
        config.outbound_queue_capacity = 4;
        let (pool, _hooks, _dir) = new_pool(config);
        let handle = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();
        let connection_id = handle.connection_id();
        let session_id = Uuid::now_v7();

        pool.fan_out_one(HookEvent::new(HookEventType::BackendError, session_id, json!({}))).await;
        for _ in 0..HEARTBEAT_MISS_THRESHOLD {
            pool.record_heartbeat(connection_id, false).await;
        }
        assert_eq!(pool.session_state(connection_id).await, Some(ObserverState::Unhealthy));

        let outcome = pool.attempt_recovery(connection_id).await;
        assert_eq!(outcome, Some(ObserverState::Recycling));
    }

    #[tokio::test]
    async fn sweep_closes_recycling_sessions_and_publishes_observer_dropped() {
        let (pool, hooks, _dir) = new_pool(PoolConfig::default());
        let mut rx = hooks.subscribe();
        let handle = pool.admit(request("https://dash", SubscriptionFilter::default())).await.unwrap();
        let connection_id = handle.connection_id();

        // drain the observer_admitted event published during admit()
        let _ = rx.recv().await;

        {
            let sessions = pool.sessions.read().await;
            let mut record = sessions.get(&connection_id).unwrap().session.write().await;
            record.state = ObserverState::Recycling;
        }
        pool.sweep().await;

        assert_eq!(pool.session_count().await, 0);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, HookEventType::ObserverDropped);
    }

    #[tokio::test]
    async fn fan_out_honors_event_type_filter() {
        let (pool, _hooks, _dir) = new_pool(PoolConfig::default());
        let session_id = Uuid::now_v7();
        let filter = SubscriptionFilter {
            session_ids: None,
            event_types: vec!["iteration_completed".to_string()],
        };
        let handle = pool.admit(request("https://dash", filter)).await.unwrap();

        pool.fan_out_one(HookEvent::new(HookEventType::IterationStarted, session_id, json!({ "n": 1 }))).await;
        pool.fan_out_one(HookEvent::new(HookEventType::IterationCompleted, session_id, json!({ "n": 1 })))
            .await;

        let received = handle.recv().await;
        assert_eq!(received.event_type, HookEventType::IterationCompleted);
    }

    #[tokio::test]
    async fn reconnect_within_ring_replays_missed_events() {
        let (pool, _hooks, _dir) = new_pool(PoolConfig::default());
        let session_id = Uuid::now_v7();
        let filter = SubscriptionFilter {
            session_ids: Some(vec![session_id]),
            event_types: Vec::new(),
        };
        let first = pool.admit(request("https://dash", filter.clone())).await.unwrap();
        let connection_id = first.connection_id();

        pool.fan_out_one(HookEvent::new(HookEventType::IterationStarted, session_id, json!({ "n": 1 }))).await;
        pool.fan_out_one(HookEvent::new(HookEventType::IterationStarted, session_id, json!({ "n": 2 }))).await;

        let mut reconnect_req = request("https://dash", filter);
        reconnect_req.reconnect = Some((connection_id, 1));
        let resumed = pool.admit(reconnect_req).await.unwrap();
        assert_eq!(resumed.connection_id(), connection_id);

        let replayed = resumed.recv().await;
        assert_eq!(replayed.payload["n"], 2);
    }
}

//! ObserverSession data model (spec.md §3, state machine in §4.G).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::HookEventType;

/// ObserverSession state machine (spec.md §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObserverState {
    Initializing,
    Ready,
    Active,
    Idle,
    Unhealthy,
    Recovering,
    Recycling,
    Closed,
    Failed,
}

impl ObserverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObserverState::Closed | ObserverState::Failed)
    }
}

/// What an observer asked to subscribe to on admission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    /// `None` means "*" (all sessions).
    #[serde(default)]
    pub session_ids: Option<Vec<uuid::Uuid>>,
    #[serde(default)]
    pub event_types: Vec<String>,
}

impl SubscriptionFilter {
    pub fn matches_session(&self, session_id: uuid::Uuid) -> bool {
        match &self.session_ids {
            None => true,
            Some(ids) => ids.contains(&session_id),
        }
    }

    /// An empty `event_types` means "all types" (the `SubscriptionFilter`
    /// default / wide-open subscription); otherwise the event's label must
    /// be named explicitly.
    pub fn matches_event_type(&self, event_type: HookEventType) -> bool {
        self.event_types.is_empty() || self.event_types.iter().any(|t| t == event_type.label())
    }
}

/// Runtime record the pool keeps for one admitted observer channel.
#[derive(Debug, Clone)]
pub struct ObserverSession {
    pub connection_id: uuid::Uuid,
    pub state: ObserverState,
    pub acquired_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub subscription_filter: SubscriptionFilter,
    /// Last event sequence number delivered, for reconnect-by-seq replay.
    pub last_seen_event_seq: u64,
    /// Consecutive missed heartbeats / write failures.
    pub missed_heartbeats: u32,
    pub dropped_events: u64,
}

impl ObserverSession {
    pub fn new(connection_id: uuid::Uuid, subscription_filter: SubscriptionFilter) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            state: ObserverState::Initializing,
            acquired_at: now,
            last_activity_at: now,
            subscription_filter,
            last_seen_event_seq: 0,
            missed_heartbeats: 0,
            dropped_events: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

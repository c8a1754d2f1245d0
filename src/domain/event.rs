//! HookEvent — the closed event taxonomy published by the journal, the
//! autopilot loop and the dual-agent coordinator (spec.md §3, §4.F).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of event types a HookBus may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventType {
    SessionCreated,
    SessionCompleted,
    IterationStarted,
    IterationCompleted,
    Handoff,
    AnalyzerVerdict,
    BackendError,
    BackendAuthRequired,
    ObserverAdmitted,
    ObserverDropped,
}

impl HookEventType {
    /// The wire name used in `SubscriptionFilter.event_types` and anywhere
    /// else a string form of the type is needed; matches the `snake_case`
    /// serde representation above.
    pub fn label(&self) -> &'static str {
        match self {
            HookEventType::SessionCreated => "session_created",
            HookEventType::SessionCompleted => "session_completed",
            HookEventType::IterationStarted => "iteration_started",
            HookEventType::IterationCompleted => "iteration_completed",
            HookEventType::Handoff => "handoff",
            HookEventType::AnalyzerVerdict => "analyzer_verdict",
            HookEventType::BackendError => "backend_error",
            HookEventType::BackendAuthRequired => "backend_auth_required",
            HookEventType::ObserverAdmitted => "observer_admitted",
            HookEventType::ObserverDropped => "observer_dropped",
        }
    }
}

/// `{type, sessionId, occurredAt, payload}` — a typed lifecycle message
/// published synchronously with a state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEvent {
    #[serde(rename = "type")]
    pub event_type: HookEventType,
    pub session_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl HookEvent {
    pub fn new(event_type: HookEventType, session_id: Uuid, payload: Value) -> Self {
        Self {
            event_type,
            session_id,
            occurred_at: Utc::now(),
            payload,
        }
    }
}

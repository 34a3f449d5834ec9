use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Delivery status of an outbox event. Owned by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// Durable record that a step completed and its effect must be relayed
/// downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    /// Name of the step that produced the event, e.g. `ProvisionUser`.
    pub step: String,
    /// Machine-readable event type, e.g. `provision_user`.
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    /// Saga the event belongs to.
    pub saga_id: String,
    pub status: EventStatus,
    /// Failed delivery attempts so far. Owned by the relay.
    pub retries: u32,
    /// Failed processing attempts on the consumer side. Owned by the
    /// consumer and counted independently of `retries`.
    #[serde(default)]
    pub redeliveries: u32,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// A new pending event with a fresh id.
    #[must_use]
    pub fn new(
        step: impl Into<String>,
        event_type: impl Into<String>,
        saga_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step: step.into(),
            event_type: event_type.into(),
            payload,
            saga_id: saga_id.into(),
            status: EventStatus::Pending,
            retries: 0,
            redeliveries: 0,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == EventStatus::Pending
    }
}

/// An event or step invocation that exhausted its retry budget.
///
/// Immutable once written; kept for offline inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    #[serde(flatten)]
    pub event: OutboxEvent,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    #[must_use]
    pub fn from_event(mut event: OutboxEvent, reason: impl Into<String>) -> Self {
        event.status = EventStatus::Failed;
        Self {
            event,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }

    /// Entry for a step whose invocation exhausted the orchestrator's retry
    /// policy. `attempts` counts the initial invocation.
    #[must_use]
    pub fn from_step_invocation(
        saga_id: impl Into<String>,
        step: impl Into<String>,
        event_type: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        let mut event = OutboxEvent::new(step, event_type, saga_id, Value::Null);
        event.retries = attempts.saturating_sub(1);
        Self::from_event(event, reason)
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use crate::error::{RelayDeliveryError, TransportError};
use crate::event::OutboxEvent;

/// Queue that step commands are published to when none is configured.
pub const DEFAULT_QUEUE: &str = "saga_commands";

/// Downstream message channel the relay publishes events to.
pub trait MessageTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the message was not accepted by the channel.
    fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Delivery function for [`OutboxRelay::drain`](crate::OutboxRelay::drain)
/// that publishes each event as JSON to `queue`.
pub fn deliver_via<'a>(
    transport: &'a dyn MessageTransport,
    queue: &'a str,
) -> impl FnMut(&OutboxEvent) -> Result<(), RelayDeliveryError> + 'a {
    move |event| {
        let body = serde_json::to_vec(event).map_err(|source| RelayDeliveryError::Encode {
            event_id: event.id.clone(),
            source,
        })?;
        debug!(queue, event_id = %event.id, bytes = body.len(), "publishing event");
        transport.publish(queue, &body)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Queues {
    messages: HashMap<String, Vec<Vec<u8>>>,
    failures_remaining: u32,
}

/// Transport that keeps published messages in memory.
///
/// Can be told to reject the next N publishes to simulate an unavailable
/// broker.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    queues: Mutex<Queues>,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` publishes, on any queue.
    #[must_use]
    pub fn failing_first(count: u32) -> Self {
        let transport = Self::default();
        transport.fail_next(count);
        transport
    }

    pub fn fail_next(&self, count: u32) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.failures_remaining = count;
        }
    }

    /// Messages published to `queue`, decoded as JSON, oldest first.
    /// Messages that are not valid JSON are skipped.
    #[must_use]
    pub fn messages(&self, queue: &str) -> Vec<Value> {
        self.queues
            .lock()
            .map(|queues| {
                queues
                    .messages
                    .get(queue)
                    .map(|bodies| {
                        bodies
                            .iter()
                            .filter_map(|body| serde_json::from_slice(body).ok())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Removes and returns the raw messages on `queue`, oldest first.
    pub fn take_messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .map(|mut queues| queues.messages.remove(queue).unwrap_or_default())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .map(|queues| queues.messages.get(queue).map_or(0, Vec::len))
            .unwrap_or_default()
    }
}

impl MessageTransport for InMemoryTransport {
    fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().map_err(|_| TransportError {
            queue: queue.to_string(),
            reason: "transport lock poisoned".to_string(),
        })?;
        if queues.failures_remaining > 0 {
            queues.failures_remaining -= 1;
            return Err(TransportError {
                queue: queue.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        queues
            .messages
            .entry(queue.to_string())
            .or_default()
            .push(payload.to_vec());
        Ok(())
    }
}

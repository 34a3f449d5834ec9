use std::sync::Arc;
use std::time::Duration;

use saga_core::{SagaStep, Sleeper};
use saga_outbox::{DeadLetterEntry, DeadLetterStore, MessageTransport, OutboxEvent, RelayPolicy};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{ProvisioningError, Result};
use crate::factory::StepFactory;
use crate::steps::ProvisioningResources;
use crate::traits::{ContextStore, ResourceStore};

/// What the consumer did with one delivered command.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// The step ran and the saga context was saved.
    Processed { saga_id: String, step: String },
    /// The message was not a usable command and was dropped.
    Ignored { reason: String },
    /// The step failed below the retry budget; deliver `event` again after
    /// `delay`.
    Redeliver { event: OutboxEvent, delay: Duration },
    /// The step failed and exhausted the budget; the event is in the
    /// dead-letter store.
    DeadLettered { event_id: String },
}

/// Replays delivered step commands against the saga's stored context.
///
/// Steps run consumer-driven and never record outbox events. Commands for
/// one saga must be handed over one at a time, in delivery order.
pub struct CommandConsumer<'a> {
    factory: &'a StepFactory,
    resources: ProvisioningResources,
    contexts: Arc<dyn ContextStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    policy: RelayPolicy,
}

impl<'a> CommandConsumer<'a> {
    #[must_use]
    pub fn new(
        factory: &'a StepFactory,
        store: Arc<dyn ResourceStore>,
        contexts: Arc<dyn ContextStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            factory,
            resources: ProvisioningResources::consumer_driven(store),
            contexts,
            dead_letters,
            policy: RelayPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RelayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Decodes and handles one raw message.
    ///
    /// # Errors
    ///
    /// Returns an error if the context or dead-letter store fails.
    pub fn handle_message(&self, body: &[u8]) -> Result<ConsumeOutcome> {
        let Ok(raw) = serde_json::from_slice::<Value>(body) else {
            return Ok(ignored("message is not JSON"));
        };
        if raw.get("type").and_then(Value::as_str).is_none() {
            return Ok(ignored("message has no type"));
        }
        if raw.get("saga_id").and_then(Value::as_str).is_none() {
            return Ok(ignored("message has no saga id"));
        }
        match serde_json::from_value::<OutboxEvent>(raw) {
            Ok(event) => self.handle(event),
            Err(e) => Ok(ignored(&format!("malformed event: {e}"))),
        }
    }

    /// Runs the step `event` describes against the saga's context.
    ///
    /// # Errors
    ///
    /// Returns an error if the context or dead-letter store fails. Step
    /// failures are reported through the outcome and counted in the event's
    /// `redeliveries`; the relay's `retries` never spend this budget.
    pub fn handle(&self, mut event: OutboxEvent) -> Result<ConsumeOutcome> {
        if event.event_type.is_empty() {
            return Ok(ignored("event has no type"));
        }
        if event.saga_id.is_empty() {
            return Ok(ignored("event has no saga id"));
        }

        let mut context = self.contexts.load(&event.saga_id)?;
        let result = self
            .factory
            .from_event(&event)
            .and_then(|step| {
                info!(saga_id = %event.saga_id, step = step.name(), "executing step from command");
                step.execute(&self.resources, &mut context)
                    .map(|_| step.name().to_string())
                    .map_err(|e| ProvisioningError::Saga(saga_core::SagaError::StepFailed {
                        saga_id: event.saga_id.clone(),
                        step: step.name().to_string(),
                        source: e,
                    }))
            });

        match result {
            Ok(step) => {
                self.contexts.save(&event.saga_id, &context)?;
                Ok(ConsumeOutcome::Processed {
                    saga_id: event.saga_id,
                    step,
                })
            }
            Err(failure) => {
                event.redeliveries += 1;
                let reason = failure_reason(&failure);
                if self.policy.is_exhausted(event.redeliveries) {
                    error!(
                        event_id = %event.id,
                        step_type = %event.event_type,
                        redeliveries = event.redeliveries,
                        error = %reason,
                        "command exhausted retries, moving to dead-letter store"
                    );
                    let event_id = event.id.clone();
                    self.dead_letters
                        .push(DeadLetterEntry::from_event(event, reason))?;
                    Ok(ConsumeOutcome::DeadLettered { event_id })
                } else {
                    let delay = self.policy.backoff(event.redeliveries);
                    warn!(
                        event_id = %event.id,
                        step_type = %event.event_type,
                        redeliveries = event.redeliveries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %reason,
                        "command failed, scheduling redelivery"
                    );
                    Ok(ConsumeOutcome::Redeliver { event, delay })
                }
            }
        }
    }

    /// Handles `body` and, when redelivery is due, waits the backoff and
    /// publishes the event back to `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails or the event cannot be republished.
    pub fn process(
        &self,
        body: &[u8],
        transport: &dyn MessageTransport,
        queue: &str,
        sleeper: &dyn Sleeper,
    ) -> Result<ConsumeOutcome> {
        let outcome = self.handle_message(body)?;
        if let ConsumeOutcome::Redeliver { event, delay } = &outcome {
            sleeper.sleep(*delay);
            let body = serde_json::to_vec(event).map_err(|source| ProvisioningError::Encode {
                event_id: event.id.clone(),
                source,
            })?;
            transport.publish(queue, &body)?;
        }
        Ok(outcome)
    }
}

fn ignored(reason: &str) -> ConsumeOutcome {
    warn!(reason, "ignoring command");
    ConsumeOutcome::Ignored {
        reason: reason.to_string(),
    }
}

/// The failure's message followed by its source chain.
fn failure_reason(failure: &ProvisioningError) -> String {
    let mut reason = failure.to_string();
    let mut source = std::error::Error::source(failure);
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}

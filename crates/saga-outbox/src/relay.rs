use std::ops::AddAssign;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use saga_core::Sleeper;
use tracing::{debug, error, info, warn};

use crate::error::{OutboxError, RelayDeliveryError, Result};
use crate::event::{DeadLetterEntry, EventStatus, OutboxEvent};
use crate::store::{DeadLetterStore, OutboxStore};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(300);

/// Relay-level retry budget, separate from the orchestrator's
/// [`RetryPolicy`](saga_core::RetryPolicy).
///
/// An event is dead-lettered once its failed delivery count reaches
/// `max_retries`. Backoff is applied between drain cycles (and between
/// consumer redeliveries), never while blocking on a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

impl RelayPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// `base_delay * 2^n`.
    #[must_use]
    pub fn backoff(&self, n: u32) -> Duration {
        self.base_delay.saturating_mul(1_u32 << n.min(20))
    }

    #[must_use]
    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

/// Outcome counts of one or more drain cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events delivered and marked sent.
    pub sent: usize,
    /// Events that failed and stay pending for a later cycle.
    pub retried: usize,
    /// Events that exhausted their budget and moved to the dead-letter store.
    pub dead_lettered: usize,
}

impl DrainReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.retried == 0 && self.dead_lettered == 0
    }
}

impl AddAssign for DrainReport {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
    }
}

/// Records step events and relays them downstream.
///
/// Drains of one relay are serialized. Status and retry changes go through
/// [`OutboxStore::update_pending`], so relays sharing a store never lose each
/// other's increments; an event settled by one relay is skipped by the
/// others. Relays racing on the same failing event may each dead-letter it.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    policy: RelayPolicy,
    drain_lock: Mutex<()>,
}

impl OutboxRelay {
    #[must_use]
    pub fn new(outbox: Arc<dyn OutboxStore>, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self {
            outbox,
            dead_letters,
            policy: RelayPolicy::default(),
            drain_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RelayPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    #[must_use]
    pub fn outbox(&self) -> &Arc<dyn OutboxStore> {
        &self.outbox
    }

    #[must_use]
    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        &self.dead_letters
    }

    /// Appends `event` as pending with zeroed retry counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox store cannot persist the event.
    pub fn record(&self, mut event: OutboxEvent) -> Result<()> {
        event.status = EventStatus::Pending;
        event.retries = 0;
        event.redeliveries = 0;
        debug!(
            event_id = %event.id,
            saga_id = %event.saga_id,
            step = %event.step,
            "recording outbox event"
        );
        self.outbox.append(event)
    }

    /// # Errors
    ///
    /// Returns an error if the outbox store cannot be read.
    pub fn pending(&self) -> Result<Vec<OutboxEvent>> {
        self.outbox.pending()
    }

    /// Runs one delivery pass over all pending events, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be read or written. Delivery
    /// failures are not errors; they are counted in the report.
    pub fn drain<F>(&self, mut deliver: F) -> Result<DrainReport>
    where
        F: FnMut(&OutboxEvent) -> std::result::Result<(), RelayDeliveryError>,
    {
        let _guard = self
            .drain_lock
            .lock()
            .map_err(|_| OutboxError::LockPoisoned)?;

        let mut report = DrainReport::default();
        for event in self.outbox.pending()? {
            match deliver(&event) {
                Ok(()) => {
                    let settled = self.outbox.update_pending(&event.id, &mut |e: &mut OutboxEvent| {
                        e.status = EventStatus::Sent;
                    })?;
                    if settled.is_some() {
                        report.sent += 1;
                        info!(event_id = %event.id, step = %event.step, "event delivered");
                    } else {
                        debug!(event_id = %event.id, "event already settled by another relay");
                    }
                }
                Err(delivery_error) => {
                    let Some(event) = self
                        .outbox
                        .update_pending(&event.id, &mut |e: &mut OutboxEvent| e.retries += 1)?
                    else {
                        debug!(event_id = %event.id, "event already settled by another relay");
                        continue;
                    };
                    if self.policy.is_exhausted(event.retries) {
                        error!(
                            event_id = %event.id,
                            step = %event.step,
                            retries = event.retries,
                            error = %delivery_error,
                            "delivery retries exhausted, moving event to dead-letter store"
                        );
                        self.dead_letters.push(DeadLetterEntry::from_event(
                            event.clone(),
                            delivery_error.to_string(),
                        ))?;
                        self.outbox.update_pending(&event.id, &mut |e: &mut OutboxEvent| {
                            e.status = EventStatus::Failed;
                        })?;
                        report.dead_lettered += 1;
                    } else {
                        warn!(
                            event_id = %event.id,
                            step = %event.step,
                            retries = event.retries,
                            error = %delivery_error,
                            "delivery failed, event stays pending"
                        );
                        report.retried += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Drains repeatedly until nothing is pending or `max_cycles` is reached,
    /// sleeping `backoff(n)` after the n-th cycle that left events pending.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub fn run_cycles<F>(
        &self,
        mut deliver: F,
        max_cycles: u32,
        sleeper: &dyn Sleeper,
    ) -> Result<DrainReport>
    where
        F: FnMut(&OutboxEvent) -> std::result::Result<(), RelayDeliveryError>,
    {
        let mut total = DrainReport::default();
        for cycle in 0..max_cycles {
            total += self.drain(&mut deliver)?;
            let remaining = self.pending()?.len();
            if remaining == 0 {
                break;
            }
            if cycle + 1 < max_cycles {
                let delay = self.policy.backoff(cycle);
                debug!(cycle, remaining, delay_ms = delay.as_millis(), "waiting before next drain");
                sleeper.sleep(delay);
            }
        }
        Ok(total)
    }
}

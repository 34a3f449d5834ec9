use std::sync::{Mutex, MutexGuard};

use crate::error::{OutboxError, Result};
use crate::event::{DeadLetterEntry, OutboxEvent};
use crate::store::{DeadLetterStore, OutboxStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| OutboxError::LockPoisoned)
}

/// Process-local outbox store; durable only for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryOutboxStore {
    events: Mutex<Vec<OutboxEvent>>,
}

impl InMemoryOutboxStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn append(&self, event: OutboxEvent) -> Result<()> {
        lock(&self.events)?.push(event);
        Ok(())
    }

    fn events(&self) -> Result<Vec<OutboxEvent>> {
        Ok(lock(&self.events)?.clone())
    }

    fn update(&self, event: &OutboxEvent) -> Result<()> {
        let mut events = lock(&self.events)?;
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| OutboxError::UnknownEvent(event.id.clone()))?;
        *slot = event.clone();
        Ok(())
    }

    fn update_pending(
        &self,
        id: &str,
        change: &mut dyn FnMut(&mut OutboxEvent),
    ) -> Result<Option<OutboxEvent>> {
        let mut events = lock(&self.events)?;
        let slot = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| OutboxError::UnknownEvent(id.to_string()))?;
        if !slot.is_pending() {
            return Ok(None);
        }
        change(&mut *slot);
        Ok(Some(slot.clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeadLetterStore for InMemoryDeadLetterStore {
    fn push(&self, entry: DeadLetterEntry) -> Result<()> {
        lock(&self.entries)?.push(entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<DeadLetterEntry>> {
        Ok(lock(&self.entries)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::event::EventStatus;

    #[test]
    fn update_replaces_event_by_id() {
        let store = InMemoryOutboxStore::new();
        let mut event = OutboxEvent::new("ProvisionUser", "provision_user", "s", json!({}));
        store.append(event.clone()).expect("append");

        event.status = EventStatus::Sent;
        store.update(&event).expect("update");

        assert_eq!(store.events().expect("events")[0].status, EventStatus::Sent);
        assert!(store.pending().expect("pending").is_empty());
    }

    #[test]
    fn update_unknown_event_fails() {
        let store = InMemoryOutboxStore::new();
        let event = OutboxEvent::new("ProvisionUser", "provision_user", "s", json!({}));

        let err = store.update(&event).expect_err("unknown event");

        assert!(matches!(err, OutboxError::UnknownEvent(id) if id == event.id));
    }

    #[test]
    fn concurrent_appends_keep_every_event() {
        let store = Arc::new(InMemoryOutboxStore::new());

        let handles: Vec<_> = (0..8)
            .map(|saga| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for step in 0..25 {
                        let event = OutboxEvent::new(
                            format!("step_{step}"),
                            "test",
                            format!("saga-{saga}"),
                            json!(step),
                        );
                        store.append(event).expect("append");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        let events = store.events().expect("events");
        assert_eq!(events.len(), 200);
        for saga in 0..8 {
            let saga_id = format!("saga-{saga}");
            assert_eq!(events.iter().filter(|e| e.saga_id == saga_id).count(), 25);
        }
    }
}

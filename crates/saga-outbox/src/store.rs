use crate::Result;
use crate::event::{DeadLetterEntry, OutboxEvent};

/// Append-mostly storage for outbox events.
///
/// Implementations must serialize writes internally: events recorded by
/// concurrently running sagas must not overwrite each other.
pub trait OutboxStore: Send + Sync {
    /// Appends an event. The event is durable once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be persisted.
    fn append(&self, event: OutboxEvent) -> Result<()>;

    /// All events in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn events(&self) -> Result<Vec<OutboxEvent>>;

    /// Replaces the stored event that has the same id.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::UnknownEvent` if no event has that id, or an
    /// error if the store cannot be written.
    fn update(&self, event: &OutboxEvent) -> Result<()>;

    /// Applies `change` to the stored event with `id` if it is still
    /// pending, atomically with respect to other writers of this store.
    ///
    /// Returns the event as written, or `None` if it had already left the
    /// pending state.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::UnknownEvent` if no event has that id, or an
    /// error if the store cannot be written.
    fn update_pending(
        &self,
        id: &str,
        change: &mut dyn FnMut(&mut OutboxEvent),
    ) -> Result<Option<OutboxEvent>>;

    /// Pending events in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn pending(&self) -> Result<Vec<OutboxEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(OutboxEvent::is_pending)
            .collect())
    }
}

/// Write-once storage for entries that exhausted their retries.
pub trait DeadLetterStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn push(&self, entry: DeadLetterEntry) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn entries(&self) -> Result<Vec<DeadLetterEntry>>;
}

//! Transactional outbox for saga side effects.
//!
//! Steps [`record`](OutboxRelay::record) an [`OutboxEvent`] when they
//! complete; the [`OutboxRelay`] later drains pending events to a downstream
//! system. Events that keep failing are moved to a dead-letter store for
//! offline inspection. Delivery is at-least-once.

mod error;
mod event;
mod file;
mod memory;
mod relay;
mod store;
mod transport;

pub use error::{OutboxError, RelayDeliveryError, Result, TransportError};
pub use event::{DeadLetterEntry, EventStatus, OutboxEvent};
pub use file::{
    DEAD_LETTER_FILENAME, JsonFileDeadLetterStore, JsonFileOutboxStore, OUTBOX_FILENAME,
    write_atomically,
};
pub use memory::{InMemoryDeadLetterStore, InMemoryOutboxStore};
pub use relay::{DrainReport, OutboxRelay, RelayPolicy};
pub use store::{DeadLetterStore, OutboxStore};
pub use transport::{DEFAULT_QUEUE, InMemoryTransport, MessageTransport, deliver_via};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OutboxError {
    #[error("failed to read outbox file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write outbox file '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse outbox file '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize outbox records for '{path}'")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("outbox event '{0}' not found")]
    UnknownEvent(String),

    #[error("outbox lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, OutboxError>;

/// Error returned by a [`MessageTransport`](crate::MessageTransport).
#[derive(Debug, Error)]
#[error("publish to queue '{queue}' failed: {reason}")]
pub struct TransportError {
    pub queue: String,
    pub reason: String,
}

/// Downstream delivery of an outbox event failed.
///
/// Counted by the relay against the event's own retry budget; never surfaced
/// to the saga that recorded the event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayDeliveryError {
    #[error("failed to encode event '{event_id}'")]
    Encode {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

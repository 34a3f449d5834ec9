use std::path::PathBuf;

use saga_core::{SagaError, StepError};
use saga_outbox::{OutboxError, TransportError};
use thiserror::Error;

/// Error from a [`ResourceStore`](crate::traits::ResourceStore) or
/// [`ContextStore`](crate::traits::ContextStore).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to read store file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write store file '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse store file '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize store file '{path}'")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("resource store unavailable: {0}")]
    Unavailable(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProvisioningError {
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("unknown step type '{0}'")]
    UnknownStepType(String),

    #[error("invalid parameters for step type '{step_type}'")]
    InvalidStepParameters {
        step_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode event '{event_id}'")]
    Encode {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Saga(#[from] SagaError<StepError>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;

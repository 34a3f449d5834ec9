use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Provisioning(#[from] saga_provisioning::ProvisioningError),

    #[error("outbox error")]
    Outbox(#[from] saga_outbox::OutboxError),

    #[error("failed to encode dead-letter entries")]
    Encode(#[source] serde_json::Error),

    #[error("saga {saga_id} was rolled back")]
    SagaFailed {
        saga_id: String,
        #[source]
        source: saga_core::SagaError<saga_core::StepError>,
    },
}

pub type Result<T> = std::result::Result<T, CliError>;

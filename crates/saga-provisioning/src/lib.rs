//! User provisioning saga built on `saga-core` and `saga-outbox`.
//!
//! Three steps provision a user, attach a quota and grant permissions. The
//! [`ProvisioningRunner`] drives them through a mediator with outbox events
//! recorded per completed step; the [`CommandConsumer`] replays delivered
//! events step by step against a stored saga context.

mod config;
mod consumer;
mod error;
mod factory;
pub mod providers;
mod runner;
pub mod steps;
pub mod traits;

pub use config::{ProvisioningConfig, RelaySettings, RetrySettings};
pub use consumer::{CommandConsumer, ConsumeOutcome};
pub use error::{ProvisioningError, Result, StoreError};
pub use factory::{StepFactory, StepSpec};
pub use runner::{ProvisioningRunner, SagaOutcome};
pub use steps::{ProvisioningResources, ProvisioningStep, StepMode};

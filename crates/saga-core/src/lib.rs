//! Saga execution engine for multi-step operations.
//!
//! A [`Mediator`] runs an ordered list of [`SagaStep`]s against a shared
//! [`SagaContext`]. Every step invocation goes through a [`RetryPolicy`]; once a
//! step fails for good, the steps that already succeeded are rolled back in
//! reverse order and the original error is returned to the caller.

mod audit;
mod context;
mod error;
mod id;
mod mediator;
mod retry;
mod state;
mod step;

pub use audit::{SagaAuditLog, StepRecord, StepStatus};
pub use context::{SAGA_ID_KEY, SagaContext};
pub use error::{RollbackError, SagaError, StepError, TransitionError};
pub use id::{SagaIdGenerator, UuidSagaIdGenerator};
pub use mediator::Mediator;
pub use retry::{Retryable, RetryPolicy, Sleeper, ThreadSleeper};
pub use state::{Saga, SagaState};
pub use step::SagaStep;

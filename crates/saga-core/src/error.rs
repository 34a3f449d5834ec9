use std::fmt::Debug;

use thiserror::Error;

use crate::retry::Retryable;
use crate::state::SagaState;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised by a step's forward operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StepError {
    /// Data the step depends on is missing from the saga context.
    ///
    /// Never retried: running the step again cannot make the data appear.
    #[error("step '{step}' requires '{missing}' in the saga context")]
    Precondition {
        /// Name of the step that could not run.
        step: String,
        /// Context key that was expected.
        missing: String,
    },

    /// The step's own operation failed.
    #[error("step '{step}' failed: {reason}")]
    Execution {
        /// Name of the step that failed.
        step: String,
        /// Human-readable cause.
        reason: String,
        /// Underlying resource error, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl StepError {
    #[must_use]
    pub fn precondition(step: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::Precondition {
            step: step.into(),
            missing: missing.into(),
        }
    }

    #[must_use]
    pub fn execution(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            step: step.into(),
            reason: reason.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn execution_caused_by(
        step: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Execution {
            step: step.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Name of the step that raised the error.
    #[must_use]
    pub fn step(&self) -> &str {
        match self {
            Self::Precondition { step, .. } | Self::Execution { step, .. } => step,
        }
    }
}

impl Retryable for StepError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

/// Error from a failed rollback during compensation.
///
/// Rollback failures never abort compensation; they are collected by the
/// mediator for diagnostics.
#[derive(Debug, Error)]
#[error("rollback failed for step '{step}': {description}")]
pub struct RollbackError<E> {
    /// Name of the step whose rollback failed.
    pub step: String,
    /// Description of what the rollback was trying to do.
    pub description: String,
    /// The underlying error.
    #[source]
    pub error: E,
}

/// A saga state change that the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid saga transition from {from} to {to}")]
pub struct TransitionError {
    pub from: SagaState,
    pub to: SagaState,
}

/// Error from saga execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SagaError<E: Debug> {
    /// A step failed after exhausting its retries; completed steps were
    /// rolled back before this error was returned.
    #[error("saga {saga_id} failed at step '{step}'")]
    StepFailed {
        /// Id of the saga that failed.
        saga_id: String,
        /// Name of the step that failed.
        step: String,
        /// The error that caused the step to fail.
        #[source]
        source: E,
    },

    /// `register` was called after execution started.
    #[error("steps cannot be registered once the saga has started")]
    RegistrationClosed,

    /// `execute_all` was called a second time on the same mediator.
    #[error("saga {saga_id} has already been executed")]
    AlreadyExecuted { saga_id: String },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl<E: Debug> SagaError<E> {
    /// Name of the failed step, if the saga failed in a step.
    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Consume the error, returning the original step error if there is one.
    #[must_use]
    pub fn into_step_error(self) -> Option<E> {
        match self {
            Self::StepFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_error_names_step_and_missing_key() {
        let err = StepError::precondition("AssignPermissions", "user");

        let msg = err.to_string();

        assert!(msg.contains("AssignPermissions"));
        assert!(msg.contains("'user'"));
    }

    #[test]
    fn only_execution_errors_are_retryable() {
        assert!(StepError::execution("a", "boom").is_retryable());
        assert!(!StepError::precondition("a", "user").is_retryable());
    }

    #[test]
    fn execution_error_keeps_its_source() {
        let io = std::io::Error::other("disk gone");
        let err = StepError::execution_caused_by("CreateQuota", "store write failed", io);

        let source = std::error::Error::source(&err).expect("source should be kept");

        assert_eq!(source.to_string(), "disk gone");
        assert_eq!(err.step(), "CreateQuota");
    }

    #[test]
    fn step_failed_exposes_original_error() {
        let err: SagaError<StepError> = SagaError::StepFailed {
            saga_id: "saga-1".to_string(),
            step: "CreateQuota".to_string(),
            source: StepError::execution("CreateQuota", "boom"),
        };

        assert_eq!(err.failed_step(), Some("CreateQuota"));
        assert!(err.to_string().contains("saga-1"));
        let inner = err.into_step_error().expect("step error");
        assert!(matches!(inner, StepError::Execution { .. }));
    }

    #[test]
    fn transition_error_message_names_both_states() {
        let err = TransitionError {
            from: SagaState::Pending,
            to: SagaState::Succeeded,
        };

        assert_eq!(
            err.to_string(),
            "invalid saga transition from PENDING to SUCCEEDED"
        );
    }
}

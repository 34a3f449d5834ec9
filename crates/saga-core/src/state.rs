use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Lifecycle status of one saga instance.
///
/// ```text
/// PENDING -> RUNNING -> SUCCEEDED
///                    -> FAILED -> COMPENSATING -> COMPENSATED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Compensating,
    Compensated,
}

impl SagaState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Compensating => "COMPENSATING",
            Self::Compensated => "COMPENSATED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Compensated)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded | Self::Failed)
                | (Self::Failed, Self::Compensating)
                | (Self::Compensating, Self::Compensated)
        )
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One saga instance: its id, current state and the last error it saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Saga {
    id: String,
    state: SagaState,
    error: Option<String>,
}

impl Saga {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SagaState::Pending,
            error: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> SagaState {
        self.state
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// # Errors
    ///
    /// Returns an error unless the saga is pending.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(SagaState::Running)
    }

    /// # Errors
    ///
    /// Returns an error unless the saga is running.
    pub fn succeed(&mut self) -> Result<(), TransitionError> {
        self.transition(SagaState::Succeeded)
    }

    /// Mark the saga failed, remembering the cause.
    ///
    /// # Errors
    ///
    /// Returns an error unless the saga is running.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(SagaState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error unless the saga has failed.
    pub fn start_compensation(&mut self) -> Result<(), TransitionError> {
        self.transition(SagaState::Compensating)
    }

    /// # Errors
    ///
    /// Returns an error unless the saga is compensating.
    pub fn compensated(&mut self) -> Result<(), TransitionError> {
        self.transition(SagaState::Compensated)
    }

    fn transition(&mut self, next: SagaState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

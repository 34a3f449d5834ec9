use std::fmt::{Debug, Display};

use tracing::{debug, error, info, warn};

use crate::audit::SagaAuditLog;
use crate::context::SagaContext;
use crate::error::{RollbackError, SagaError};
use crate::id::{SagaIdGenerator, UuidSagaIdGenerator};
use crate::retry::{RetryPolicy, Retryable, Sleeper, ThreadSleeper};
use crate::state::{Saga, SagaState};
use crate::step::SagaStep;

/// Drives one saga: runs the registered steps in order and compensates on
/// failure.
///
/// Each step invocation goes through the mediator's [`RetryPolicy`]. When a
/// step fails for good, the steps that completed before it are rolled back in
/// reverse order (LIFO) and the original step error is returned. The step
/// that failed is not rolled back.
///
/// A mediator runs exactly one saga; steps can only be registered before
/// [`Mediator::execute_all`] is called.
pub struct Mediator<S: SagaStep> {
    steps: Vec<S>,
    retry_policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    id_generator: Box<dyn SagaIdGenerator>,
    saga: Option<Saga>,
    audit_log: SagaAuditLog,
    rollback_failures: Vec<RollbackError<S::Error>>,
}

impl<S: SagaStep> Default for Mediator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SagaStep> Mediator<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            retry_policy: RetryPolicy::default(),
            sleeper: Box::new(ThreadSleeper),
            id_generator: Box::new(UuidSagaIdGenerator),
            saga: None,
            audit_log: SagaAuditLog::new(),
            rollback_failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, id_generator: impl SagaIdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Append a step to the saga.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::RegistrationClosed` once execution has started.
    pub fn register(&mut self, step: S) -> Result<(), SagaError<S::Error>>
    where
        S::Error: Debug,
    {
        if self.saga.is_some() {
            return Err(SagaError::RegistrationClosed);
        }
        debug!(step = step.name(), position = self.steps.len(), "registered step");
        self.steps.push(step);
        Ok(())
    }

    #[must_use]
    pub fn steps(&self) -> &[S] {
        &self.steps
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// The saga record, available once execution has started.
    #[must_use]
    pub fn saga(&self) -> Option<&Saga> {
        self.saga.as_ref()
    }

    /// Current saga state; `Pending` before execution.
    #[must_use]
    pub fn state(&self) -> SagaState {
        self.saga.as_ref().map_or(SagaState::Pending, Saga::state)
    }

    #[must_use]
    pub fn audit_log(&self) -> &SagaAuditLog {
        &self.audit_log
    }

    /// Rollbacks that failed during compensation, in the order they ran.
    #[must_use]
    pub fn rollback_failures(&self) -> &[RollbackError<S::Error>] {
        &self.rollback_failures
    }

    /// Execute all registered steps against `context`.
    ///
    /// A fresh saga id is generated and stored in the context before the
    /// first step runs. On success every step's output is in the context.
    /// On failure the context has been compensated: completed steps were
    /// rolled back in reverse order.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::StepFailed` carrying the original step error after
    /// compensation has finished. Returns `SagaError::AlreadyExecuted` if the
    /// mediator has already run.
    pub fn execute_all(
        &mut self,
        resources: &S::Resources,
        context: &mut SagaContext,
    ) -> Result<(), SagaError<S::Error>>
    where
        S::Error: Retryable + Display + Debug,
    {
        if let Some(saga) = &self.saga {
            return Err(SagaError::AlreadyExecuted {
                saga_id: saga.id().to_string(),
            });
        }

        let mut saga = Saga::new(self.id_generator.generate());
        context.set_saga_id(saga.id());
        saga.start()?;
        info!(saga_id = saga.id(), steps = self.steps.len(), "saga started");

        let mut completed: Vec<usize> = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            let step_name = step.name();
            self.audit_log.record_start(step_name);
            info!(saga_id = saga.id(), step = step_name, "executing step");

            let (result, attempts) = self
                .retry_policy
                .run(step_name, self.sleeper.as_ref(), || step.execute(resources, context));

            match result {
                Ok(output) => {
                    debug!(step = step_name, attempts, %output, "step succeeded");
                    self.audit_log
                        .record_success(attempts, step.compensation_description());
                    completed.push(index);
                }
                Err(step_error) => {
                    error!(
                        saga_id = saga.id(),
                        step = step_name,
                        attempts,
                        error = %step_error,
                        "step failed"
                    );
                    self.audit_log.record_failure(attempts);
                    saga.fail(step_error.to_string())?;
                    let step_name = step_name.to_string();

                    saga.start_compensation()?;
                    self.compensate(resources, context, &completed, saga.id());
                    saga.compensated()?;
                    info!(
                        saga_id = saga.id(),
                        rolled_back = completed.len(),
                        rollback_failures = self.rollback_failures.len(),
                        "saga compensated"
                    );

                    let saga_id = saga.id().to_string();
                    self.saga = Some(saga);
                    return Err(SagaError::StepFailed {
                        saga_id,
                        step: step_name,
                        source: step_error,
                    });
                }
            }
        }

        saga.succeed()?;
        info!(saga_id = saga.id(), "saga succeeded");
        self.saga = Some(saga);
        Ok(())
    }

    fn compensate(
        &mut self,
        resources: &S::Resources,
        context: &mut SagaContext,
        completed: &[usize],
        saga_id: &str,
    ) where
        S::Error: Display,
    {
        for &index in completed.iter().rev() {
            let step = &self.steps[index];
            let step_name = step.name();
            let description = step.compensation_description();
            info!(saga_id, step = step_name, "rolling back step");

            match step.rollback(resources, context) {
                Ok(()) => {
                    self.audit_log.record_compensated(index);
                    debug!(saga_id, step = step_name, "rollback succeeded");
                }
                Err(error) => {
                    warn!(
                        saga_id,
                        step = step_name,
                        error = %error,
                        "rollback failed, continuing compensation"
                    );
                    self.audit_log.record_compensation_failed(index);
                    self.rollback_failures.push(RollbackError {
                        step: step_name.to_string(),
                        description,
                        error,
                    });
                }
            }
        }
    }
}

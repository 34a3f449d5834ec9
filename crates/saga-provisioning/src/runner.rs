use std::sync::Arc;

use saga_core::{
    Mediator, RetryPolicy, Retryable, SagaAuditLog, SagaContext, SagaError, SagaState, SagaStep,
    Sleeper, StepError, ThreadSleeper,
};
use saga_outbox::DeadLetterEntry;
use tracing::{error, info};

use crate::error::{ProvisioningError, Result};
use crate::factory::{StepFactory, StepSpec};
use crate::steps::{ProvisioningResources, ProvisioningStep};

/// Result of one provisioning saga.
pub struct SagaOutcome {
    mediator: Mediator<ProvisioningStep>,
    context: SagaContext,
    error: Option<SagaError<StepError>>,
}

impl SagaOutcome {
    #[must_use]
    pub fn saga_id(&self) -> Option<&str> {
        self.mediator.saga().map(saga_core::Saga::id)
    }

    #[must_use]
    pub fn state(&self) -> SagaState {
        self.mediator.state()
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// The context after the run; compensated steps have removed their keys.
    #[must_use]
    pub fn context(&self) -> &SagaContext {
        &self.context
    }

    #[must_use]
    pub fn audit_log(&self) -> &SagaAuditLog {
        self.mediator.audit_log()
    }

    #[must_use]
    pub fn error(&self) -> Option<&SagaError<StepError>> {
        self.error.as_ref()
    }

    /// # Errors
    ///
    /// Returns the saga failure, if there was one.
    pub fn into_result(self) -> Result<SagaContext> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(self.context),
        }
    }
}

/// Runs provisioning sagas built from step specs.
pub struct ProvisioningRunner<'a> {
    factory: &'a StepFactory,
    resources: ProvisioningResources,
    retry_policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<'a> ProvisioningRunner<'a> {
    #[must_use]
    pub fn new(factory: &'a StepFactory, resources: ProvisioningResources) -> Self {
        Self {
            factory,
            resources,
            retry_policy: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn resources(&self) -> &ProvisioningResources {
        &self.resources
    }

    /// Runs one saga over `steps`, in order.
    ///
    /// A step failure is reported through [`SagaOutcome::error`] after
    /// compensation. When the failure exhausted the retry policy, the step
    /// invocation is also written to the dead-letter store.
    ///
    /// # Errors
    ///
    /// Returns an error only if the dead-letter entry cannot be written.
    pub fn run(&self, steps: &[StepSpec]) -> Result<SagaOutcome> {
        let mut mediator = Mediator::new()
            .with_retry_policy(self.retry_policy.clone())
            .with_sleeper(Arc::clone(&self.sleeper));
        for spec in steps {
            mediator.register(self.factory.from_spec(spec))?;
        }

        let mut context = SagaContext::new();
        let error = mediator.execute_all(&self.resources, &mut context).err();

        if let Some(SagaError::StepFailed {
            saga_id,
            step,
            source,
        }) = &error
        {
            error!(%saga_id, %step, error = %source, "provisioning saga compensated");
            if source.is_retryable() {
                self.dead_letter_step(&mediator, saga_id, step, source)?;
            }
        } else if error.is_none() {
            info!(saga_id = ?mediator.saga().map(saga_core::Saga::id), "provisioning saga succeeded");
        }

        Ok(SagaOutcome {
            mediator,
            context,
            error,
        })
    }

    fn dead_letter_step(
        &self,
        mediator: &Mediator<ProvisioningStep>,
        saga_id: &str,
        step_name: &str,
        source: &StepError,
    ) -> Result<()> {
        let Some(relay) = self.resources.outbox() else {
            return Ok(());
        };
        let step_type = mediator
            .steps()
            .iter()
            .find(|s| s.name() == step_name)
            .map_or(step_name, |s| s.step_type());
        let attempts = mediator
            .audit_log()
            .records()
            .last()
            .map_or(1, |record| record.attempts);

        relay
            .dead_letters()
            .push(DeadLetterEntry::from_step_invocation(
                saga_id,
                step_name,
                step_type,
                attempts,
                source.to_string(),
            ))
            .map_err(ProvisioningError::from)
    }
}

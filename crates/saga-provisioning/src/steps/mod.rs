//! Provisioning steps and the resources they run against.

mod assign_permissions;
mod create_quota;
mod provision_user;

use std::sync::Arc;

use saga_core::{SAGA_ID_KEY, SagaContext, SagaStep, StepError};
use saga_outbox::{OutboxEvent, OutboxRelay};
use serde_json::Value;

pub use assign_permissions::AssignPermissions;
pub use create_quota::{CreateQuota, QUOTA_ID_PREFIX, QuotaValues, default_quota_values};
pub use provision_user::ProvisionUser;

use crate::traits::ResourceStore;

/// Context key holding the provisioned user, `{id, name}`.
pub const USER_KEY: &str = "user";
/// Context key holding the granted permission list.
pub const PERMISSIONS_KEY: &str = "permissions";
/// Context key holding the created quota, `{id, user_id, values}`.
pub const QUOTA_KEY: &str = "quota";

/// How a step was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Driven by the mediator; successful steps record an outbox event.
    Orchestrated,
    /// Replayed from a delivered event; no outbox event is recorded, since
    /// that event would be delivered back to the consumer.
    ConsumerDriven,
}

/// Dependencies shared by all provisioning steps.
#[derive(Clone)]
pub struct ProvisioningResources {
    store: Arc<dyn ResourceStore>,
    outbox: Option<Arc<OutboxRelay>>,
}

impl ProvisioningResources {
    #[must_use]
    pub fn orchestrated(store: Arc<dyn ResourceStore>, outbox: Arc<OutboxRelay>) -> Self {
        Self {
            store,
            outbox: Some(outbox),
        }
    }

    #[must_use]
    pub fn consumer_driven(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            outbox: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> StepMode {
        if self.outbox.is_some() {
            StepMode::Orchestrated
        } else {
            StepMode::ConsumerDriven
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn outbox(&self) -> Option<&Arc<OutboxRelay>> {
        self.outbox.as_ref()
    }

    /// Records the step's completion event. Consumer-driven steps record
    /// nothing.
    fn record_event(
        &self,
        ctx: &SagaContext,
        step: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<(), StepError> {
        let Some(outbox) = &self.outbox else {
            return Ok(());
        };
        let saga_id = ctx
            .saga_id()
            .ok_or_else(|| StepError::precondition(step, SAGA_ID_KEY))?;
        outbox
            .record(OutboxEvent::new(step, event_type, saga_id, payload))
            .map_err(|e| StepError::execution_caused_by(step, "failed to record outbox event", e))
    }
}

/// Reads `ctx[USER_KEY].id`.
fn user_id(ctx: &SagaContext) -> Option<String> {
    ctx.get(USER_KEY)
        .and_then(|user| user.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Finishes a step whose resource is already created: records the outbox
/// event, or undoes the step if the event cannot be recorded.
fn complete<S>(
    step: &S,
    resources: &ProvisioningResources,
    ctx: &mut SagaContext,
    event_payload: Value,
    output: Value,
) -> Result<Value, StepError>
where
    S: SagaStep<Resources = ProvisioningResources, Error = StepError> + StepKind,
{
    if let Err(err) = resources.record_event(ctx, step.name(), S::STEP_TYPE, event_payload) {
        step.rollback(resources, ctx)?;
        return Err(err);
    }
    Ok(output)
}

/// The machine-readable type of a step, used for outbox events and the
/// step factory.
pub trait StepKind {
    const STEP_TYPE: &'static str;
}

/// The closed set of provisioning steps.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisioningStep {
    ProvisionUser(ProvisionUser),
    CreateQuota(CreateQuota),
    AssignPermissions(AssignPermissions),
}

impl ProvisioningStep {
    #[must_use]
    pub fn step_type(&self) -> &'static str {
        match self {
            Self::ProvisionUser(_) => ProvisionUser::STEP_TYPE,
            Self::CreateQuota(_) => CreateQuota::STEP_TYPE,
            Self::AssignPermissions(_) => AssignPermissions::STEP_TYPE,
        }
    }

    #[must_use]
    pub fn fails(&self) -> bool {
        match self {
            Self::ProvisionUser(step) => step.fails(),
            Self::CreateQuota(step) => step.fails(),
            Self::AssignPermissions(step) => step.fails(),
        }
    }
}

impl From<ProvisionUser> for ProvisioningStep {
    fn from(step: ProvisionUser) -> Self {
        Self::ProvisionUser(step)
    }
}

impl From<CreateQuota> for ProvisioningStep {
    fn from(step: CreateQuota) -> Self {
        Self::CreateQuota(step)
    }
}

impl From<AssignPermissions> for ProvisioningStep {
    fn from(step: AssignPermissions) -> Self {
        Self::AssignPermissions(step)
    }
}

impl SagaStep for ProvisioningStep {
    type Resources = ProvisioningResources;
    type Error = StepError;

    fn name(&self) -> &str {
        match self {
            Self::ProvisionUser(step) => step.name(),
            Self::CreateQuota(step) => step.name(),
            Self::AssignPermissions(step) => step.name(),
        }
    }

    fn execute(
        &self,
        resources: &Self::Resources,
        ctx: &mut SagaContext,
    ) -> Result<Value, Self::Error> {
        match self {
            Self::ProvisionUser(step) => step.execute(resources, ctx),
            Self::CreateQuota(step) => step.execute(resources, ctx),
            Self::AssignPermissions(step) => step.execute(resources, ctx),
        }
    }

    fn rollback(&self, resources: &Self::Resources, ctx: &mut SagaContext) -> Result<(), Self::Error> {
        match self {
            Self::ProvisionUser(step) => step.rollback(resources, ctx),
            Self::CreateQuota(step) => step.rollback(resources, ctx),
            Self::AssignPermissions(step) => step.rollback(resources, ctx),
        }
    }

    fn compensation_description(&self) -> String {
        match self {
            Self::ProvisionUser(step) => step.compensation_description(),
            Self::CreateQuota(step) => step.compensation_description(),
            Self::AssignPermissions(step) => step.compensation_description(),
        }
    }
}

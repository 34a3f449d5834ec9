use saga_core::{SagaContext, SagaStep, StepError};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ProvisioningResources, StepKind, USER_KEY, complete, user_id};
use crate::traits::ResourceKind;

const STEP_NAME: &str = "ProvisionUser";

/// Creates the user every later step hangs off.
///
/// Stores `user = {id, name}` in the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionUser {
    name: String,
    user_id: Option<String>,
    fail: bool,
}

impl ProvisionUser {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: None,
            fail: false,
        }
    }

    /// Use a fixed user id instead of generating one per execution.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Make every execution fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn fails(&self) -> bool {
        self.fail
    }
}

impl StepKind for ProvisionUser {
    const STEP_TYPE: &'static str = "provision_user";
}

impl SagaStep for ProvisionUser {
    type Resources = ProvisioningResources;
    type Error = StepError;

    fn name(&self) -> &str {
        STEP_NAME
    }

    fn execute(
        &self,
        resources: &Self::Resources,
        ctx: &mut SagaContext,
    ) -> Result<Value, Self::Error> {
        if self.fail {
            return Err(StepError::execution(STEP_NAME, "simulated failure"));
        }

        let id = self
            .user_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user = json!({"id": id, "name": self.name});
        resources
            .store()
            .create(ResourceKind::User, user.clone())
            .map_err(|e| StepError::execution_caused_by(STEP_NAME, "failed to create user", e))?;
        ctx.insert(USER_KEY, user.clone());
        debug!(user_id = %id, name = %self.name, "user provisioned");

        complete(
            self,
            resources,
            ctx,
            json!({"user_id": id, "name": self.name}),
            user,
        )
    }

    fn rollback(&self, resources: &Self::Resources, ctx: &mut SagaContext) -> Result<(), Self::Error> {
        let Some(id) = user_id(ctx) else {
            debug!("no user in context, nothing to roll back");
            return Ok(());
        };
        if let Err(error) = resources.store().delete(ResourceKind::User, &id) {
            warn!(user_id = %id, error = %error, "failed to delete user during rollback");
        }
        ctx.remove(USER_KEY);
        debug!(user_id = %id, "user rolled back");
        Ok(())
    }

    fn compensation_description(&self) -> String {
        format!("delete user '{}'", self.name)
    }
}

use saga_core::{SagaContext, SagaStep, StepError};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{PERMISSIONS_KEY, ProvisioningResources, StepKind, USER_KEY, complete, user_id};
use crate::traits::ResourceKind;

const STEP_NAME: &str = "AssignPermissions";

/// Grants permissions to the provisioned user.
///
/// Requires `user`; stores `permissions = [...]`. The grant is stored under
/// the user's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignPermissions {
    permissions: Vec<String>,
    fail: bool,
}

impl Default for AssignPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignPermissions {
    /// Grants `["read"]`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_permissions(vec!["read".to_string()])
    }

    #[must_use]
    pub fn with_permissions(permissions: Vec<String>) -> Self {
        Self {
            permissions,
            fail: false,
        }
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    #[must_use]
    pub fn fails(&self) -> bool {
        self.fail
    }
}

impl StepKind for AssignPermissions {
    const STEP_TYPE: &'static str = "assign_permissions";
}

impl SagaStep for AssignPermissions {
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
        let owner = user_id(ctx).ok_or_else(|| StepError::precondition(STEP_NAME, USER_KEY))?;

        resources
            .store()
            .create(
                ResourceKind::Permissions,
                json!({"id": owner, "permissions": self.permissions}),
            )
            .map_err(|e| {
                StepError::execution_caused_by(STEP_NAME, "failed to store permission grant", e)
            })?;
        let granted = json!(self.permissions);
        ctx.insert(PERMISSIONS_KEY, granted.clone());
        debug!(user_id = %owner, permissions = ?self.permissions, "permissions assigned");

        complete(
            self,
            resources,
            ctx,
            json!({"user_id": owner, "permissions": self.permissions}),
            granted,
        )
    }

    fn rollback(&self, resources: &Self::Resources, ctx: &mut SagaContext) -> Result<(), Self::Error> {
        if !ctx.contains_key(PERMISSIONS_KEY) {
            debug!("no permissions in context, nothing to roll back");
            return Ok(());
        }
        match user_id(ctx) {
            Some(owner) => {
                if let Err(error) = resources.store().delete(ResourceKind::Permissions, &owner) {
                    warn!(user_id = %owner, error = %error, "failed to revoke permissions during rollback");
                }
            }
            None => warn!("permissions present without a user, clearing context only"),
        }
        ctx.remove(PERMISSIONS_KEY);
        debug!("permissions rolled back");
        Ok(())
    }

    fn compensation_description(&self) -> String {
        format!("revoke permissions {:?}", self.permissions)
    }
}

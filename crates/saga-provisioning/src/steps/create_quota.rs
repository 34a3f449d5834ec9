use saga_core::{SagaContext, SagaStep, StepError};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ProvisioningResources, QUOTA_KEY, StepKind, USER_KEY, complete, user_id};
use crate::traits::ResourceKind;

const STEP_NAME: &str = "CreateQuota";

/// Prefix of the quota id generated when none is configured.
pub const QUOTA_ID_PREFIX: &str = "quota-";

/// Named quota limits, e.g. `storage_gb`.
pub type QuotaValues = Map<String, Value>;

/// `{storage_gb: 10, ops_per_month: 1000}`.
#[must_use]
pub fn default_quota_values() -> QuotaValues {
    let mut values = QuotaValues::new();
    values.insert("storage_gb".to_string(), json!(10));
    values.insert("ops_per_month".to_string(), json!(1000));
    values
}

/// Attaches a quota to the provisioned user.
///
/// Requires `user`; stores `quota = {id, user_id, values}`. Without a
/// configured id every execution creates a fresh `quota-<uuid>`, so sagas
/// sharing a store never touch each other's quota.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateQuota {
    quota_id: Option<String>,
    values: QuotaValues,
    fail: bool,
}

impl Default for CreateQuota {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateQuota {
    #[must_use]
    pub fn new() -> Self {
        Self {
            quota_id: None,
            values: default_quota_values(),
            fail: false,
        }
    }

    #[must_use]
    pub fn with_quota_id(mut self, quota_id: impl Into<String>) -> Self {
        self.quota_id = Some(quota_id.into());
        self
    }

    #[must_use]
    pub fn with_values(mut self, values: QuotaValues) -> Self {
        self.values = values;
        self
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    #[must_use]
    pub fn quota_id(&self) -> Option<&str> {
        self.quota_id.as_deref()
    }

    #[must_use]
    pub fn values(&self) -> &QuotaValues {
        &self.values
    }

    #[must_use]
    pub fn fails(&self) -> bool {
        self.fail
    }
}

impl StepKind for CreateQuota {
    const STEP_TYPE: &'static str = "create_quota";
}

impl SagaStep for CreateQuota {
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
        let quota_id = self
            .quota_id
            .clone()
            .unwrap_or_else(|| format!("{QUOTA_ID_PREFIX}{}", Uuid::new_v4()));

        let quota = json!({
            "id": quota_id,
            "user_id": owner,
            "values": self.values,
        });
        resources
            .store()
            .create(ResourceKind::Quota, quota.clone())
            .map_err(|e| StepError::execution_caused_by(STEP_NAME, "failed to create quota", e))?;
        ctx.insert(QUOTA_KEY, quota.clone());
        debug!(%quota_id, user_id = %owner, "quota created");

        complete(
            self,
            resources,
            ctx,
            json!({
                "quota_id": quota_id,
                "user_id": owner,
                "values": self.values,
            }),
            quota,
        )
    }

    fn rollback(&self, resources: &Self::Resources, ctx: &mut SagaContext) -> Result<(), Self::Error> {
        let Some(quota_id) = ctx
            .get(QUOTA_KEY)
            .and_then(|quota| quota.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            debug!("no quota in context, nothing to roll back");
            return Ok(());
        };
        if let Err(error) = resources.store().delete(ResourceKind::Quota, &quota_id) {
            warn!(%quota_id, error = %error, "failed to delete quota during rollback");
        }
        ctx.remove(QUOTA_KEY);
        debug!(%quota_id, "quota rolled back");
        Ok(())
    }

    fn compensation_description(&self) -> String {
        match &self.quota_id {
            Some(quota_id) => format!("delete quota '{quota_id}'"),
            None => "delete quota".to_string(),
        }
    }
}

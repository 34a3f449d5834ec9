use std::collections::BTreeSet;

use saga_outbox::OutboxEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ProvisioningError, Result};
use crate::steps::{
    AssignPermissions, CreateQuota, ProvisionUser, ProvisioningStep, QuotaValues, StepKind,
};

/// Declarative description of one step, as written in configuration files
/// and carried in outbox event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepSpec {
    ProvisionUser {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default)]
        fail: bool,
    },
    CreateQuota {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quota_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<QuotaValues>,
        #[serde(default)]
        fail: bool,
    },
    AssignPermissions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permissions: Option<Vec<String>>,
        #[serde(default)]
        fail: bool,
    },
}

impl StepSpec {
    #[must_use]
    pub fn step_type(&self) -> &'static str {
        match self {
            Self::ProvisionUser { .. } => ProvisionUser::STEP_TYPE,
            Self::CreateQuota { .. } => CreateQuota::STEP_TYPE,
            Self::AssignPermissions { .. } => AssignPermissions::STEP_TYPE,
        }
    }
}

/// Builds provisioning steps by type name.
///
/// Constructed once and passed by reference to whatever needs to build
/// steps. Steps can be marked as failing by type (`create_quota`) or step
/// name (`CreateQuota`) to exercise compensation.
#[derive(Debug, Clone, Default)]
pub struct StepFactory {
    failing: BTreeSet<String>,
}

impl StepFactory {
    pub const KNOWN_TYPES: [&'static str; 3] = [
        ProvisionUser::STEP_TYPE,
        CreateQuota::STEP_TYPE,
        AssignPermissions::STEP_TYPE,
    ];

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces every step of the given type or name to fail.
    #[must_use]
    pub fn with_failing(mut self, step: impl Into<String>) -> Self {
        self.failing.insert(step.into());
        self
    }

    #[must_use]
    pub fn is_known_type(step_type: &str) -> bool {
        Self::KNOWN_TYPES.contains(&step_type)
    }

    /// Builds a step of `step_type` from JSON parameters. `Value::Null` means
    /// no parameters.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStepType` for names outside the known set, or
    /// `InvalidStepParameters` if `params` does not fit the step.
    pub fn create(&self, step_type: &str, params: Value) -> Result<ProvisioningStep> {
        if !Self::is_known_type(step_type) {
            return Err(ProvisioningError::UnknownStepType(step_type.to_string()));
        }
        let mut fields = match params {
            Value::Object(fields) => fields,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(ProvisioningError::InvalidStepParameters {
                    step_type: step_type.to_string(),
                    source: <serde_json::Error as serde::de::Error>::custom(format!(
                        "expected an object, found {other}"
                    )),
                });
            }
        };
        fields.insert("type".to_string(), Value::String(step_type.to_string()));

        let spec: StepSpec = serde_json::from_value(Value::Object(fields)).map_err(|source| {
            ProvisioningError::InvalidStepParameters {
                step_type: step_type.to_string(),
                source,
            }
        })?;
        Ok(self.from_spec(&spec))
    }

    /// Rebuilds the step that produced `event`, using the event payload as
    /// parameters.
    ///
    /// # Errors
    ///
    /// Same as [`StepFactory::create`].
    pub fn from_event(&self, event: &OutboxEvent) -> Result<ProvisioningStep> {
        debug!(event_id = %event.id, step_type = %event.event_type, "building step from event");
        self.create(&event.event_type, event.payload.clone())
    }

    #[must_use]
    pub fn from_spec(&self, spec: &StepSpec) -> ProvisioningStep {
        let step: ProvisioningStep = match spec {
            StepSpec::ProvisionUser {
                name,
                user_id,
                fail,
            } => {
                let mut step = ProvisionUser::new(name.clone());
                if let Some(id) = user_id {
                    step = step.with_user_id(id.clone());
                }
                if *fail {
                    step = step.failing();
                }
                step.into()
            }
            StepSpec::CreateQuota {
                quota_id,
                values,
                fail,
            } => {
                let mut step = CreateQuota::new();
                if let Some(id) = quota_id {
                    step = step.with_quota_id(id.clone());
                }
                if let Some(values) = values {
                    step = step.with_values(values.clone());
                }
                if *fail {
                    step = step.failing();
                }
                step.into()
            }
            StepSpec::AssignPermissions { permissions, fail } => {
                let mut step = permissions
                    .clone()
                    .map_or_else(AssignPermissions::new, AssignPermissions::with_permissions);
                if *fail {
                    step = step.failing();
                }
                step.into()
            }
        };
        self.apply_failures(step)
    }

    fn apply_failures(&self, step: ProvisioningStep) -> ProvisioningStep {
        use saga_core::SagaStep;

        if step.fails()
            || !(self.failing.contains(step.step_type()) || self.failing.contains(step.name()))
        {
            return step;
        }
        debug!(step = step.name(), "step forced to fail");
        match step {
            ProvisioningStep::ProvisionUser(s) => s.failing().into(),
            ProvisioningStep::CreateQuota(s) => s.failing().into(),
            ProvisioningStep::AssignPermissions(s) => s.failing().into(),
        }
    }
}

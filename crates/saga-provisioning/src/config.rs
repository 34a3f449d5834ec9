use std::fs;
use std::path::Path;
use std::time::Duration;

use saga_core::RetryPolicy;
use saga_outbox::{DEFAULT_QUEUE, RelayPolicy};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ProvisioningError, Result};
use crate::factory::StepSpec;

/// Orchestrator retry settings, the `[retry]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    max_retries: u32,
    base_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_delay_ms: Option<u64>,
    jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: None,
            jitter: 0.0,
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_jitter(self.jitter);
        match self.max_delay_ms {
            Some(ms) => policy.with_max_delay(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

/// Relay and consumer settings, the `[relay]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    max_retries: u32,
    cycle_delay_ms: u64,
    max_cycles: u32,
    queue: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cycle_delay_ms: 300,
            max_cycles: 5,
            queue: DEFAULT_QUEUE.to_string(),
        }
    }
}

impl RelaySettings {
    #[must_use]
    pub fn policy(&self) -> RelayPolicy {
        RelayPolicy::new(self.max_retries, Duration::from_millis(self.cycle_delay_ms))
    }

    #[must_use]
    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Settings for a provisioning run, read from TOML:
///
/// ```toml
/// [retry]
/// max_retries = 3
/// base_delay_ms = 500
///
/// [relay]
/// queue = "saga_commands"
///
/// [[steps]]
/// type = "provision_user"
/// name = "alice"
///
/// [[steps]]
/// type = "assign_permissions"
/// permissions = ["read", "write"]
/// ```
///
/// Omitted tables take their defaults; an omitted `steps` list means the
/// default saga (provision `alice`, create a quota, grant read and write).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    retry: RetrySettings,
    relay: RelaySettings,
    steps: Vec<StepSpec>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            relay: RelaySettings::default(),
            steps: default_steps(),
        }
    }
}

fn default_steps() -> Vec<StepSpec> {
    let mut quota_values = serde_json::Map::new();
    quota_values.insert("storage_gb".to_string(), json!(10));
    vec![
        StepSpec::ProvisionUser {
            name: "alice".to_string(),
            user_id: None,
            fail: false,
        },
        StepSpec::CreateQuota {
            quota_id: None,
            values: Some(quota_values),
            fail: false,
        },
        StepSpec::AssignPermissions {
            permissions: Some(vec!["read".to_string(), "write".to_string()]),
            fail: false,
        },
    ]
}

impl ProvisioningConfig {
    /// Reads the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ProvisioningError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ProvisioningError::ConfigParse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    #[must_use]
    pub fn retry(&self) -> &RetrySettings {
        &self.retry
    }

    #[must_use]
    pub fn relay(&self) -> &RelaySettings {
        &self.relay
    }

    #[must_use]
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<StepSpec>) -> Self {
        self.steps = steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ProvisioningConfig = toml::from_str("").expect("parse");

        assert_eq!(config, ProvisioningConfig::default());
        assert_eq!(config.retry().policy(), RetryPolicy::default());
        assert_eq!(config.relay().policy(), RelayPolicy::default());
        assert_eq!(config.relay().queue(), "saga_commands");
        let types: Vec<_> = config.steps().iter().map(StepSpec::step_type).collect();
        assert_eq!(types, vec!["provision_user", "create_quota", "assign_permissions"]);
    }

    #[test]
    fn parses_tables_and_step_list() {
        let config: ProvisioningConfig = toml::from_str(
            r#"
            [retry]
            max_retries = 1
            base_delay_ms = 10
            max_delay_ms = 15
            jitter = 0.1

            [relay]
            queue = "provisioning"

            [[steps]]
            type = "provision_user"
            name = "bob"
            user_id = "u-bob"

            [[steps]]
            type = "create_quota"
            quota_id = "q-bob"
            fail = true

            [steps.values]
            storage_gb = 50
            "#,
        )
        .expect("parse");

        let policy = config.retry().policy();
        assert_eq!(policy.max_retries(), 1);
        assert_eq!(policy.base_delay(), Duration::from_millis(10));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(15));
        assert_eq!(config.relay().queue(), "provisioning");
        assert_eq!(config.relay().max_cycles(), 5);
        assert_eq!(config.steps().len(), 2);
        match &config.steps()[1] {
            StepSpec::CreateQuota {
                quota_id,
                values,
                fail,
            } => {
                assert_eq!(quota_id.as_deref(), Some("q-bob"));
                assert_eq!(values.as_ref().map(|v| v["storage_gb"].clone()), Some(json!(50)));
                assert!(*fail);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn unknown_step_type_fails_to_parse() {
        let result: std::result::Result<ProvisioningConfig, _> = toml::from_str(
            r#"
            [[steps]]
            type = "delete_user"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn load_reports_path_on_parse_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("saga.toml");
        fs::write(&path, "[retry]\nmax_retries = \"many\"\n")?;

        let err = ProvisioningConfig::load(&path).expect_err("invalid config");

        assert!(matches!(err, ProvisioningError::ConfigParse { .. }));
        assert!(err.to_string().contains("saga.toml"));
        Ok(())
    }
}

mod dlq;
mod drain;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;
use saga_outbox::{JsonFileDeadLetterStore, JsonFileOutboxStore, OutboxRelay};
use saga_provisioning::ProvisioningConfig;

use crate::error::Result;

const CONSUMER_DIR: &str = "consumer";

/// Global options shared by every command.
pub(crate) struct Settings {
    data_dir: PathBuf,
    config: ProvisioningConfig,
}

impl Settings {
    pub(crate) fn new(data_dir: PathBuf, config: ProvisioningConfig) -> Self {
        Self { data_dir, config }
    }

    fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// State kept by the command consumer, apart from the orchestrator's.
    fn consumer_dir(&self) -> PathBuf {
        self.data_dir.join(CONSUMER_DIR)
    }

    fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    fn relay(&self) -> OutboxRelay {
        OutboxRelay::new(
            Arc::new(JsonFileOutboxStore::in_dir(&self.data_dir)),
            Arc::new(JsonFileDeadLetterStore::in_dir(&self.data_dir)),
        )
        .with_policy(self.config.relay().policy())
    }
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a provisioning saga and record its outbox events
    Run(run::RunArgs),
    /// Deliver pending outbox events to the command queue
    Drain(drain::DrainArgs),
    /// List events and step invocations in the dead-letter store
    Dlq(dlq::DlqArgs),
}

impl Commands {
    pub(crate) fn execute(self, settings: &Settings) -> Result<()> {
        match self {
            Self::Run(args) => run::run(settings, &args),
            Self::Drain(args) => drain::run(settings, &args),
            Self::Dlq(args) => dlq::run(settings, &args),
        }
    }
}

use std::sync::Arc;

use clap::Args;
use saga_provisioning::providers::JsonFileResourceStore;
use saga_provisioning::{
    ProvisioningError, ProvisioningResources, ProvisioningRunner, SagaOutcome, StepFactory,
};
use tracing::info;

use super::Settings;
use crate::error::{CliError, Result};

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Make a step fail on every attempt, by type or name (repeatable)
    #[arg(long = "fail", value_name = "STEP")]
    fail: Vec<String>,
}

pub(crate) fn run(settings: &Settings, args: &RunArgs) -> Result<()> {
    let factory = args
        .fail
        .iter()
        .fold(StepFactory::new(), |factory, step| factory.with_failing(step));
    let relay = Arc::new(settings.relay());
    let store = Arc::new(JsonFileResourceStore::in_dir(settings.data_dir()));
    let resources = ProvisioningResources::orchestrated(store, relay);
    let config = settings.config();
    info!(
        data_dir = %settings.data_dir().display(),
        steps = config.steps().len(),
        "starting provisioning saga"
    );

    let outcome = ProvisioningRunner::new(&factory, resources)
        .with_retry_policy(config.retry().policy())
        .run(config.steps())?;

    print_outcome(&outcome);

    let saga_id = outcome.saga_id().unwrap_or_default().to_string();
    match outcome.into_result() {
        Ok(_) => Ok(()),
        Err(ProvisioningError::Saga(source)) => Err(CliError::SagaFailed { saga_id, source }),
        Err(other) => Err(other.into()),
    }
}

fn print_outcome(outcome: &SagaOutcome) {
    println!(
        "Saga {}: {}",
        outcome.saga_id().unwrap_or("<unstarted>"),
        outcome.state()
    );
    let summary = outcome.audit_log().summary();
    if !summary.is_empty() {
        println!("{summary}");
    }

    if outcome.succeeded() {
        println!();
        println!("Context:");
        for (key, value) in outcome.context().iter() {
            println!("  {key}: {value}");
        }
    }
}

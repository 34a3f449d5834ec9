use std::sync::Arc;

use clap::Args;
use saga_core::ThreadSleeper;
use saga_outbox::{DrainReport, InMemoryTransport, JsonFileDeadLetterStore, deliver_via};
use saga_provisioning::providers::{JsonFileContextStore, JsonFileResourceStore};
use saga_provisioning::{CommandConsumer, ConsumeOutcome, StepFactory};

use super::Settings;
use crate::error::Result;

#[derive(Args)]
pub(crate) struct DrainArgs {
    /// Replay delivered commands through the command consumer
    #[arg(long)]
    consume: bool,

    /// Make a step fail on the consumer side, by type or name (repeatable)
    #[arg(long = "fail", value_name = "STEP", requires = "consume")]
    fail: Vec<String>,
}

#[derive(Debug, Default)]
struct ConsumeTally {
    processed: usize,
    redelivered: usize,
    dead_lettered: usize,
    ignored: usize,
}

impl ConsumeTally {
    fn count(&mut self, outcome: &ConsumeOutcome) {
        match outcome {
            ConsumeOutcome::Processed { .. } => self.processed += 1,
            ConsumeOutcome::Redeliver { .. } => self.redelivered += 1,
            ConsumeOutcome::DeadLettered { .. } => self.dead_lettered += 1,
            ConsumeOutcome::Ignored { .. } => self.ignored += 1,
        }
    }
}

pub(crate) fn run(settings: &Settings, args: &DrainArgs) -> Result<()> {
    let relay_settings = settings.config().relay();
    let queue = relay_settings.queue();
    let relay = settings.relay();
    let transport = InMemoryTransport::new();

    let report = relay.run_cycles(
        deliver_via(&transport, queue),
        relay_settings.max_cycles(),
        &ThreadSleeper,
    )?;
    print_report(&report);

    if args.consume {
        let factory = args
            .fail
            .iter()
            .fold(StepFactory::new(), |factory, step| factory.with_failing(step));
        let consumer_dir = settings.consumer_dir();
        let consumer = CommandConsumer::new(
            &factory,
            Arc::new(JsonFileResourceStore::in_dir(&consumer_dir)),
            Arc::new(JsonFileContextStore::in_dir(&consumer_dir)),
            Arc::new(JsonFileDeadLetterStore::in_dir(settings.data_dir())),
        )
        .with_policy(relay_settings.policy());

        let mut tally = ConsumeTally::default();
        loop {
            let batch = transport.take_messages(queue);
            if batch.is_empty() {
                break;
            }
            for body in batch {
                let outcome = consumer.process(&body, &transport, queue, &ThreadSleeper)?;
                tally.count(&outcome);
            }
        }
        println!(
            "Consumed: {} processed, {} redelivered, {} dead-lettered, {} ignored",
            tally.processed, tally.redelivered, tally.dead_lettered, tally.ignored
        );
    }

    Ok(())
}

fn print_report(report: &DrainReport) {
    if report.is_empty() {
        println!("No pending events.");
        return;
    }
    println!(
        "Delivered: {} sent, {} retried, {} dead-lettered",
        report.sent, report.retried, report.dead_lettered
    );
}

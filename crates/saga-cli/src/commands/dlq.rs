use clap::Args;
use saga_outbox::{DeadLetterEntry, DeadLetterStore, JsonFileDeadLetterStore};

use super::Settings;
use crate::error::{CliError, Result};

#[derive(Args)]
pub(crate) struct DlqArgs {
    /// Print the entries as a JSON array
    #[arg(long)]
    json: bool,
}

pub(crate) fn run(settings: &Settings, args: &DlqArgs) -> Result<()> {
    let entries = JsonFileDeadLetterStore::in_dir(settings.data_dir()).entries()?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&entries).map_err(CliError::Encode)?;
        println!("{rendered}");
        return Ok(());
    }

    if entries.is_empty() {
        println!("Dead-letter store is empty.");
        return Ok(());
    }

    println!("Dead-lettered: {}", entries.len());
    println!();
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &DeadLetterEntry) {
    let event = &entry.event;
    println!(
        "{} {} ({}) saga {} after {} retries",
        entry.failed_at.format("%Y-%m-%dT%H:%M:%SZ"),
        event.step,
        event.event_type,
        event.saga_id,
        event.retries
    );
    if event.redeliveries > 0 {
        println!("  consumer redeliveries: {}", event.redeliveries);
    }
    println!("  reason: {}", entry.reason);
}

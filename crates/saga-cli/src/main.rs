mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use saga_provisioning::ProvisioningConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::{Commands, Settings};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "saga")]
#[command(about = "Run user provisioning sagas and operate their outbox", long_about = None)]
struct Cli {
    /// Directory holding resources, outbox and dead-letter files
    #[arg(long = "data-dir", short = 'd', global = true, default_value = "saga-data")]
    data_dir: PathBuf,

    /// TOML file with retry, relay and step settings (default: built-in demo saga)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_error(&e);
            return ExitCode::FAILURE;
        }
    };
    let settings = Settings::new(cli.data_dir, config);

    if let Err(e) = cli.command.execute(&settings) {
        print_error(&e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<ProvisioningConfig, CliError> {
    match path {
        Some(path) => Ok(ProvisioningConfig::load(path)?),
        None => Ok(ProvisioningConfig::default()),
    }
}

fn print_error(error: &CliError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }
}

//! pvz-loadtest: k6-style load generator for the PVZ pickup-point API.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pvz_loadtest::loadtest::thresholds::THRESHOLD_FAILED_EXIT_CODE;

mod commands;

/// Synthetic HTTP load for the PVZ pickup-point management API
#[derive(Parser)]
#[command(name = "pvz-loadtest")]
#[command(about = "Drive scripted PVZ API flows under constant-rate or ramping load", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> Result<()> {
    // BASE_URL and RUST_LOG may come from a local .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if !cli.command.execute()? {
        std::process::exit(THRESHOLD_FAILED_EXIT_CODE);
    }

    Ok(())
}

/// Diagnostics go to stderr so stdout carries only the summary.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "pvz_loadtest=debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

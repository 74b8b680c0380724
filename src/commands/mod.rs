//! `pvz-loadtest` CLI subcommands.
//!
//! Provides `run` (execute a load test) and `init` (generate starter config).

mod init;
mod run;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

/// Directory holding the config file and reports.
pub const CONFIG_DIR: &str = ".pvz-loadtest";

/// Config filename inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "loadtest.toml";

/// Load test commands for the PVZ service.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against a PVZ service
    ///
    /// Executes the scenarios defined in .pvz-loadtest/loadtest.toml (or a
    /// custom config path, or a built-in preset). Reports results to the
    /// terminal and writes a JSON report to .pvz-loadtest/reports/.
    Run {
        /// Path to config file (default: auto-discover .pvz-loadtest/loadtest.toml)
        #[arg(long, conflicts_with = "preset")]
        config: Option<PathBuf>,

        /// Built-in preset: moderate_load, dual_role_rate or dual_role_ramp
        #[arg(long)]
        preset: Option<String>,

        /// Target service base URL (overrides config)
        #[arg(long, env = "BASE_URL")]
        base_url: Option<String>,

        /// Load duration, e.g. "30s" or "2m" (overrides constant-arrival-rate scenarios)
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Stop after this many iterations across all scenarios
        #[arg(long)]
        iterations: Option<u64>,

        /// Run only the scenario with this name
        #[arg(long)]
        scenario: Option<String>,

        /// Disable JSON report output
        #[arg(long)]
        no_report: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Generate a starter loadtest config file
    ///
    /// Creates .pvz-loadtest/loadtest.toml containing every built-in preset
    /// as a scenario.
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Execute the selected subcommand.
    ///
    /// Returns `Ok(false)` when the run completed but a threshold failed.
    pub fn execute(self) -> Result<bool> {
        match self {
            Command::Run {
                config,
                preset,
                base_url,
                duration,
                iterations,
                scenario,
                no_report,
                no_color,
            } => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(run::RunOptions {
                    config,
                    preset,
                    base_url,
                    duration,
                    iterations,
                    scenario,
                    no_report,
                    no_color,
                }))
            },
            Command::Init { force } => {
                init::execute_init(force)?;
                Ok(true)
            },
        }
    }
}

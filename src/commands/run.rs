//! `pvz-loadtest run` command implementation.

use anyhow::Result;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pvz_loadtest::loadtest::config::{Executor, LoadTestConfig};
use pvz_loadtest::loadtest::engine::LoadTestEngine;
use pvz_loadtest::loadtest::presets;
use pvz_loadtest::loadtest::report::{write_report, LoadTestReport};
use pvz_loadtest::loadtest::summary::render_summary;

use super::{CONFIG_DIR, CONFIG_FILE};

/// Flags accepted by `run`.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub base_url: Option<String>,
    pub duration: Option<Duration>,
    pub iterations: Option<u64>,
    pub scenario: Option<String>,
    pub no_report: bool,
    pub no_color: bool,
}

/// Execute the `run` command.
///
/// Loads config (preset, explicit path or auto-discovery), applies CLI
/// overrides, runs the engine, prints the summary and writes the report.
/// Returns whether every threshold passed.
pub async fn execute_run(opts: RunOptions) -> Result<bool> {
    // Step 1: Load config
    let mut config = load_config(opts.config.as_deref(), opts.preset.as_deref())?;

    // Step 2: Apply CLI overrides
    if let Some(name) = opts.scenario.as_deref() {
        config.retain_scenario(name)?;
    }
    apply_overrides(&mut config, opts.base_url, opts.duration);

    // Step 3: Build and run the engine
    let mut engine = LoadTestEngine::new(config)
        .with_no_color(opts.no_color)
        .with_live_display(std::io::stderr().is_terminal());
    if let Some(n) = opts.iterations {
        engine = engine.with_iterations(n);
    }

    let result = engine
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Load test failed: {}", e))?;

    // Step 4: Output k6-style terminal summary
    if opts.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let summary = render_summary(&result, engine.config());
    println!("{summary}");

    // Step 5: Write JSON report (unless --no-report)
    if !opts.no_report {
        let report = LoadTestReport::from_result(&result, engine.config());
        let cwd = std::env::current_dir()?;
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                // Non-fatal: the test itself completed.
                eprintln!();
                eprintln!("Warning: Failed to write report: {}", e);
            },
        }
    }

    Ok(result.thresholds_passed())
}

/// Resolve the config source: `--preset`, then `--config`, then discovery.
fn load_config(config_path: Option<&Path>, preset: Option<&str>) -> Result<LoadTestConfig> {
    if let Some(name) = preset {
        eprintln!("Using preset: {name}");
        return Ok(presets::preset(name)?);
    }

    let config_file = match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `pvz-loadtest init` to create one.",
                    path.display()
                );
            }
            path.to_path_buf()
        },
        None => {
            let cwd = std::env::current_dir()?;
            match discover_config(&cwd) {
                Some(path) => path,
                None => {
                    anyhow::bail!(
                        "No loadtest config found.\n\
                         Run `pvz-loadtest init` to create {CONFIG_DIR}/{CONFIG_FILE},\n\
                         use `--config path/to/file.toml`, or pick a built-in `--preset` ({}).",
                        presets::PRESET_NAMES.join(", ")
                    );
                },
            }
        },
    };

    eprintln!("Loading config from: {}", config_file.display());

    LoadTestConfig::load(&config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", config_file.display(), e))
}

/// Apply CLI flag overrides to a loaded config.
///
/// `--duration` only applies to constant-arrival-rate scenarios; ramping
/// scenarios take their length from their stages and are left untouched.
fn apply_overrides(config: &mut LoadTestConfig, base_url: Option<String>, duration: Option<Duration>) {
    if let Some(url) = base_url {
        config.settings.base_url = url;
    }
    if let Some(d) = duration {
        for scenario in &mut config.scenario {
            match &mut scenario.executor {
                Executor::ConstantArrivalRate(car) => car.duration = d,
                Executor::RampingVus(_) => tracing::warn!(
                    scenario = %scenario.name,
                    "--duration ignored for ramping-vus scenario (stages define its length)"
                ),
            }
        }
    }
}

/// Discover `.pvz-loadtest/loadtest.toml` by walking up from `start`.
///
/// Stops at the first match or at the filesystem root, the same way `.git`
/// discovery works.
fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

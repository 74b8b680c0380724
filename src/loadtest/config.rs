//! TOML-based load test scenario configuration.
//!
//! A config file names one or more scenarios. Each scenario pairs a
//! [`Flow`] (the fixed request sequence run once per iteration) with an
//! [`Executor`] describing the load shape. All scenarios in a file run
//! concurrently.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! base_url = "http://localhost:8080"
//! timeout_ms = 5000
//!
//! [[scenario]]
//! name = "moderate_load"
//! flow = "moderator-product"
//!
//! [scenario.executor]
//! type = "constant-arrival-rate"
//! rate = 50
//! time_unit = "1s"
//! duration = "30s"
//! pre_allocated_vus = 10
//! max_vus = 50
//!
//! [[scenario]]
//! name = "dual_role_ramp"
//! flow = "dual-role"
//!
//! [scenario.executor]
//! type = "ramping-vus"
//! stages = [
//!     { duration = "10s", target = 10 },
//!     { duration = "20s", target = 20 },
//!     { duration = "10s", target = 0 },
//! ]
//!
//! [thresholds]
//! checks_rate = 0.99
//! http_req_duration_p95_ms = 500
//! ```
//!
//! The k6 spellings `timeUnit`, `preAllocatedVUs`, `maxVUs` and `startVUs`
//! are accepted as aliases.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;

/// Default target service address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Top-level load test configuration parsed from a TOML file.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoadTestConfig {
    /// General load test settings.
    #[serde(default)]
    pub settings: Settings,
    /// Scenarios to run concurrently.
    ///
    /// The field name is `scenario` (not `scenarios`) because TOML
    /// `[[scenario]]` array-of-tables syntax creates a key called `scenario`.
    pub scenario: Vec<ScenarioConfig>,
    /// Pass/fail criteria that decide the process exit status.
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// General settings shared by every scenario.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Base URL of the PVZ service under test.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Expected interval between consecutive requests from a single VU (ms).
    ///
    /// Used for coordinated omission correction via HdrHistogram's
    /// `record_correct()`.
    #[serde(default = "default_expected_interval")]
    pub expected_interval_ms: u64,
    /// How long in-flight iterations may keep running after the executor
    /// stops starting new ones.
    #[serde(with = "humantime_serde", default = "default_graceful_stop")]
    pub graceful_stop: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            expected_interval_ms: default_expected_interval(),
            graceful_stop: default_graceful_stop(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Default expected interval for coordinated omission correction: 100ms.
fn default_expected_interval() -> u64 {
    100
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_city() -> String {
    "Moscow".to_string()
}

fn default_product_type() -> String {
    "box".to_string()
}

/// The fixed request sequence executed once per iteration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Flow {
    /// Moderator logs in, creates a pickup point and adds a product to it.
    ModeratorProduct,
    /// Moderator logs in and creates a pickup point, then an employee logs in.
    DualRole,
    /// Full reception lifecycle across both roles.
    ReceptionCycle,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ModeratorProduct => "moderator-product",
            Self::DualRole => "dual-role",
            Self::ReceptionCycle => "reception-cycle",
        };
        f.write_str(s)
    }
}

/// One named scenario: a flow plus the load shape that drives it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScenarioConfig {
    /// Scenario name, used to label metrics and filter runs.
    pub name: String,
    /// Request sequence run per iteration.
    pub flow: Flow,
    /// City sent when creating pickup points.
    #[serde(default = "default_city")]
    pub city: String,
    /// Product type sent when adding products.
    #[serde(default = "default_product_type")]
    pub product_type: String,
    /// Load shape.
    pub executor: Executor,
}

/// Load shape for a scenario. The two forms are mutually exclusive.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Executor {
    /// Start iterations at a fixed rate regardless of how long earlier
    /// iterations take, up to `max_vus` concurrent iterations.
    ConstantArrivalRate(ArrivalRate),
    /// Ramp the number of looping VUs through a list of stages.
    RampingVus(RampingVus),
}

impl Executor {
    /// Total time the executor keeps starting new iterations.
    pub fn duration(&self) -> Duration {
        match self {
            Self::ConstantArrivalRate(car) => car.duration,
            Self::RampingVus(ramp) => ramp.total_duration(),
        }
    }

    /// Upper bound on concurrently running VUs.
    pub fn max_vus(&self) -> u32 {
        match self {
            Self::ConstantArrivalRate(car) => car.max_vus,
            Self::RampingVus(ramp) => ramp.max_target(),
        }
    }

    /// Executor name as written in config files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConstantArrivalRate(_) => "constant-arrival-rate",
            Self::RampingVus(_) => "ramping-vus",
        }
    }
}

/// Constant-arrival-rate descriptor.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ArrivalRate {
    /// Iterations started per `time_unit`.
    pub rate: u32,
    /// Period over which `rate` iterations are started.
    #[serde(
        with = "humantime_serde",
        default = "default_time_unit",
        alias = "timeUnit"
    )]
    pub time_unit: Duration,
    /// How long to keep starting iterations.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// VUs expected to be enough for the configured rate.
    #[serde(alias = "preAllocatedVUs")]
    pub pre_allocated_vus: u32,
    /// Hard cap on concurrent iterations; ticks beyond it are dropped.
    #[serde(alias = "maxVUs")]
    pub max_vus: u32,
}

impl ArrivalRate {
    /// Interval between two consecutive iteration starts.
    pub fn interval(&self) -> Duration {
        if self.rate == 0 {
            return self.time_unit;
        }
        self.time_unit / self.rate
    }

    /// Number of iterations the dispatcher will attempt over the full duration.
    pub fn planned_iterations(&self) -> u64 {
        let unit = self.time_unit.as_secs_f64();
        if unit <= 0.0 {
            return 0;
        }
        (self.duration.as_secs_f64() / unit * f64::from(self.rate)).floor() as u64
    }
}

/// A ramp stage: reach `target` VUs linearly over `duration`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Stage {
    /// Length of this stage.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// VU count at the end of this stage.
    pub target: u32,
}

/// Ramping-VUs descriptor.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RampingVus {
    /// VU count at the start of the first stage.
    #[serde(default, alias = "startVUs")]
    pub start_vus: u32,
    /// Ordered ramp stages.
    pub stages: Vec<Stage>,
}

impl RampingVus {
    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest VU count reached at any point.
    pub fn max_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start_vus)
    }

    /// Target VU count `elapsed` into the ramp.
    ///
    /// Interpolates linearly between the previous stage's target (or
    /// `start_vus`) and the current stage's target. Past the last stage the
    /// final target holds.
    pub fn vus_at(&self, elapsed: Duration) -> u32 {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end && !stage.duration.is_zero() {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let from_f = f64::from(from);
                let to_f = f64::from(stage.target);
                return (from_f + (to_f - from_f) * progress).round() as u32;
            }
            from = stage.target;
            stage_start = stage_end;
        }
        from
    }

    /// Index of the stage active at `elapsed`, clamped to the last stage.
    pub fn stage_index_at(&self, elapsed: Duration) -> usize {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return idx;
            }
        }
        self.stages.len().saturating_sub(1)
    }
}

/// Pass/fail criteria evaluated against the final metrics snapshot.
///
/// Every field is optional; an absent field is not evaluated.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Thresholds {
    /// Minimum fraction of checks that must pass.
    pub checks_rate: Option<f64>,
    /// Maximum fraction of requests allowed to fail.
    pub http_req_failed_rate: Option<f64>,
    /// Maximum success-latency P95 in milliseconds.
    pub http_req_duration_p95_ms: Option<u64>,
    /// Maximum success-latency P99 in milliseconds.
    pub http_req_duration_p99_ms: Option<u64>,
    /// Maximum number of dropped iterations.
    pub dropped_iterations: Option<u64>,
}

impl Thresholds {
    /// Returns `true` if no threshold is configured.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Longest executor duration across all scenarios.
    pub fn effective_duration(&self) -> Duration {
        self.scenario
            .iter()
            .map(|s| s.executor.duration())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Sum of `max_vus` across scenarios; sizes the metrics channel.
    pub fn total_max_vus(&self) -> u32 {
        self.scenario.iter().map(|s| s.executor.max_vus()).sum()
    }

    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    /// Keep only the scenario called `name`.
    pub fn retain_scenario(&mut self, name: &str) -> Result<(), LoadTestError> {
        self.scenario.retain(|s| s.name == name);
        if self.scenario.is_empty() {
            return Err(LoadTestError::Cli {
                message: format!("No scenario named '{name}' in config"),
            });
        }
        Ok(())
    }

    /// Iterations the arrival-rate scenarios plan to start. Ramping scenarios
    /// have no fixed plan and add nothing.
    pub fn planned_iterations(&self) -> u64 {
        self.scenario
            .iter()
            .map(|s| match &s.executor {
                Executor::ConstantArrivalRate(car) => car.planned_iterations(),
                Executor::RampingVus(_) => 0,
            })
            .sum()
    }

    /// Validate that the config is semantically correct.
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.scenario.is_empty() {
            return Err(LoadTestError::validation(
                "Config must contain at least one [[scenario]]",
            ));
        }

        let url = url::Url::parse(&self.settings.base_url).map_err(|e| {
            LoadTestError::validation(format!(
                "settings.base_url '{}' is not a valid URL: {e}",
                self.settings.base_url
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LoadTestError::validation(format!(
                "settings.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.settings.timeout_ms == 0 {
            return Err(LoadTestError::validation(
                "settings.timeout_ms must be greater than 0",
            ));
        }

        let mut names = HashSet::new();
        for scenario in &self.scenario {
            if scenario.name.trim().is_empty() {
                return Err(LoadTestError::validation("Scenario name must not be empty"));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(LoadTestError::validation(format!(
                    "Duplicate scenario name '{}'",
                    scenario.name
                )));
            }
            validate_executor(&scenario.name, &scenario.executor)?;
        }

        for (name, rate) in [
            ("checks_rate", self.thresholds.checks_rate),
            ("http_req_failed_rate", self.thresholds.http_req_failed_rate),
        ] {
            if let Some(rate) = rate {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(LoadTestError::validation(format!(
                        "thresholds.{name} must be between 0.0 and 1.0, got {rate}"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_executor(scenario: &str, executor: &Executor) -> Result<(), LoadTestError> {
    match executor {
        Executor::ConstantArrivalRate(car) => {
            if car.rate == 0 {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': rate must be greater than 0"
                )));
            }
            if car.time_unit.is_zero() {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': time_unit must be greater than 0"
                )));
            }
            if car.interval().is_zero() {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': rate {} per {:?} leaves less than 1ns between iterations",
                    car.rate, car.time_unit
                )));
            }
            if car.duration.is_zero() {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': duration must be greater than 0"
                )));
            }
            if car.max_vus == 0 {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': max_vus must be greater than 0"
                )));
            }
            if car.max_vus < car.pre_allocated_vus {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': max_vus ({}) must be >= pre_allocated_vus ({})",
                    car.max_vus, car.pre_allocated_vus
                )));
            }
        },
        Executor::RampingVus(ramp) => {
            if ramp.stages.is_empty() {
                return Err(LoadTestError::validation(format!(
                    "Scenario '{scenario}': ramping-vus needs at least one stage"
                )));
            }
            for (i, stage) in ramp.stages.iter().enumerate() {
                if stage.duration.is_zero() {
                    return Err(LoadTestError::validation(format!(
                        "Scenario '{scenario}': stage {} has zero duration; each stage must have a positive duration",
                        i + 1
                    )));
                }
            }
        },
    }
    Ok(())
}

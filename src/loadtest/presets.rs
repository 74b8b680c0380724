//! Built-in load profiles usable without a config file.
//!
//! Each preset is one scenario with default [`Settings`]:
//!
//! | name             | flow                | executor                               |
//! |------------------|---------------------|----------------------------------------|
//! | `moderate_load`  | `moderator-product` | 50 iters/1s for 30s, 10 pre / 50 max   |
//! | `dual_role_rate` | `dual-role`         | 50 iters/1s for 30s, 10 pre / 50 max   |
//! | `dual_role_ramp` | `dual-role`         | 10s to 10, 20s to 20, 10s to 0 VUs     |

use std::time::Duration;

use crate::loadtest::config::{
    ArrivalRate, Executor, Flow, LoadTestConfig, RampingVus, ScenarioConfig, Settings, Stage,
    Thresholds,
};
use crate::loadtest::error::LoadTestError;

/// Names accepted by `--preset`.
pub const PRESET_NAMES: &[&str] = &["moderate_load", "dual_role_rate", "dual_role_ramp"];

/// Build the preset called `name`.
pub fn preset(name: &str) -> Result<LoadTestConfig, LoadTestError> {
    let (flow, executor) = match name {
        "moderate_load" => (Flow::ModeratorProduct, moderate_arrival_rate()),
        "dual_role_rate" => (Flow::DualRole, moderate_arrival_rate()),
        "dual_role_ramp" => (Flow::DualRole, dual_role_stages()),
        other => {
            return Err(LoadTestError::Cli {
                message: format!(
                    "Unknown preset '{other}'. Available presets: {}",
                    PRESET_NAMES.join(", ")
                ),
            })
        },
    };

    Ok(LoadTestConfig {
        settings: Settings::default(),
        scenario: vec![ScenarioConfig {
            name: name.to_string(),
            flow,
            city: "Moscow".to_string(),
            product_type: "box".to_string(),
            executor,
        }],
        thresholds: Thresholds::default(),
    })
}

fn moderate_arrival_rate() -> Executor {
    Executor::ConstantArrivalRate(ArrivalRate {
        rate: 50,
        time_unit: Duration::from_secs(1),
        duration: Duration::from_secs(30),
        pre_allocated_vus: 10,
        max_vus: 50,
    })
}

fn dual_role_stages() -> Executor {
    let stage = |secs, target| Stage {
        duration: Duration::from_secs(secs),
        target,
    };
    Executor::RampingVus(RampingVus {
        start_vus: 0,
        stages: vec![stage(10, 10), stage(20, 20), stage(10, 0)],
    })
}

/// Starter config written by `pvz-loadtest init`.
///
/// Contains every preset as a `[[scenario]]` block. Running it unfiltered
/// drives all three at once; pass `--scenario` to pick one.
pub fn starter_toml() -> String {
    r#"# Load test configuration for pvz-loadtest

[settings]
# Base URL of the PVZ service (overridden by --base-url or BASE_URL)
base_url = "http://localhost:8080"

# Per-request timeout in milliseconds
timeout_ms = 10000

# Expected interval between requests (ms) for coordinated omission correction
# expected_interval_ms = 100

# How long in-flight iterations may finish after the load shape ends
graceful_stop = "30s"

# Moderator logs in, creates a pickup point, adds a product.
[[scenario]]
name = "moderate_load"
flow = "moderator-product"
city = "Moscow"
product_type = "box"

[scenario.executor]
type = "constant-arrival-rate"
rate = 50
time_unit = "1s"
duration = "30s"
pre_allocated_vus = 10
max_vus = 50

# Moderator creates a pickup point, then an employee logs in.
[[scenario]]
name = "dual_role_rate"
flow = "dual-role"

[scenario.executor]
type = "constant-arrival-rate"
rate = 50
time_unit = "1s"
duration = "30s"
pre_allocated_vus = 10
max_vus = 50

# Same flow under a ramping VU count.
[[scenario]]
name = "dual_role_ramp"
flow = "dual-role"

[scenario.executor]
type = "ramping-vus"
stages = [
    { duration = "10s", target = 10 },
    { duration = "20s", target = 20 },
    { duration = "10s", target = 0 },
]

# Full reception lifecycle (reception, product, delete, close, list).
# [[scenario]]
# name = "reception_cycle"
# flow = "reception-cycle"
#
# [scenario.executor]
# type = "constant-arrival-rate"
# rate = 10
# time_unit = "1s"
# duration = "30s"
# pre_allocated_vus = 5
# max_vus = 20

[thresholds]
checks_rate = 0.99
# http_req_failed_rate = 0.01
# http_req_duration_p95_ms = 500
# http_req_duration_p99_ms = 1000
# dropped_iterations = 0
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_validates() {
        for name in PRESET_NAMES {
            let config = preset(name).unwrap();
            config.validate().unwrap();
            assert_eq!(config.scenario.len(), 1);
            assert_eq!(config.scenario[0].name, *name);
            assert_eq!(config.settings.base_url, "http://localhost:8080");
        }
    }

    #[test]
    fn test_moderate_load_shape() {
        let config = preset("moderate_load").unwrap();
        let scenario = &config.scenario[0];
        assert_eq!(scenario.flow, Flow::ModeratorProduct);
        match &scenario.executor {
            Executor::ConstantArrivalRate(car) => {
                assert_eq!(car.rate, 50);
                assert_eq!(car.time_unit, Duration::from_secs(1));
                assert_eq!(car.duration, Duration::from_secs(30));
                assert_eq!(car.pre_allocated_vus, 10);
                assert_eq!(car.max_vus, 50);
            },
            other => panic!("Expected constant-arrival-rate, got {other:?}"),
        }
    }

    #[test]
    fn test_dual_role_presets_share_flow() {
        let rate = preset("dual_role_rate").unwrap();
        let ramp = preset("dual_role_ramp").unwrap();
        assert_eq!(rate.scenario[0].flow, Flow::DualRole);
        assert_eq!(ramp.scenario[0].flow, Flow::DualRole);
        assert_eq!(rate.scenario[0].executor, moderate_arrival_rate());
        assert_eq!(ramp.effective_duration(), Duration::from_secs(40));
        assert_eq!(ramp.total_max_vus(), 20);
    }

    #[test]
    fn test_unknown_preset_lists_available_names() {
        let err = preset("smoke").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("smoke"), "got: {msg}");
        assert!(msg.contains("moderate_load"), "got: {msg}");
    }

    #[test]
    fn test_starter_toml_matches_presets() {
        let config = LoadTestConfig::from_toml(&starter_toml()).unwrap();
        assert_eq!(config.scenario.len(), PRESET_NAMES.len());
        for (scenario, name) in config.scenario.iter().zip(PRESET_NAMES) {
            let expected = preset(name).unwrap();
            assert_eq!(scenario.name, *name);
            assert_eq!(scenario.flow, expected.scenario[0].flow);
            assert_eq!(scenario.executor, expected.scenario[0].executor);
        }
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.thresholds.checks_rate, Some(0.99));
    }
}

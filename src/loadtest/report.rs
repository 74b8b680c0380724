//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON report containing check tallies,
//! request latency percentiles, iteration counters, threshold outcomes and
//! the full resolved config for reproducibility. Intended for CI pipelines.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;
use crate::loadtest::thresholds::ThresholdResult;

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
pub const SCHEMA_VERSION: &str = "1.0";

/// Directory (relative to the working directory) reports are written to.
pub const REPORTS_DIR: &str = ".pvz-loadtest/reports";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// Report format version.
    pub schema_version: String,
    /// RFC 3339 timestamp when the report was generated.
    pub timestamp: String,
    /// Target service base URL.
    pub target_url: String,
    /// Actual test duration in seconds.
    pub duration_secs: f64,
    /// Highest number of simultaneously active VUs.
    pub peak_vus: u32,
    /// Full resolved configuration (with CLI overrides applied).
    pub config: serde_json::Value,
    /// Check tallies in first-seen order.
    pub checks: Vec<CheckReport>,
    /// Request metrics.
    pub http: HttpMetrics,
    /// Iteration metrics.
    pub iterations: IterationMetrics,
    /// Per-endpoint metrics keyed by endpoint label.
    pub per_endpoint: BTreeMap<String, EndpointReportMetrics>,
    /// Threshold outcomes.
    pub thresholds: Vec<ThresholdResult>,
    /// `true` when no threshold failed.
    pub thresholds_passed: bool,
}

/// One check's tally.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    /// Check name.
    pub name: String,
    /// Passes.
    pub passes: u64,
    /// Failures.
    pub fails: u64,
    /// Pass fraction.
    pub rate: f64,
}

/// Aggregate request metrics.
#[derive(Debug, Serialize)]
pub struct HttpMetrics {
    /// Total requests.
    pub total_requests: u64,
    /// Successful requests.
    pub success_count: u64,
    /// Failed requests.
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Requests per second.
    pub throughput_rps: f64,
    /// Latency percentiles.
    pub latency: LatencyMetrics,
    /// Error counts by classification.
    pub errors: HashMap<String, u64>,
}

/// Latency percentile metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct LatencyMetrics {
    /// Success P50.
    pub p50_ms: u64,
    /// Success P95.
    pub p95_ms: u64,
    /// Success P99.
    pub p99_ms: u64,
    /// Error P50.
    pub error_p50_ms: u64,
    /// Error P95.
    pub error_p95_ms: u64,
    /// Error P99.
    pub error_p99_ms: u64,
}

/// Iteration counters and timing.
#[derive(Debug, Serialize)]
pub struct IterationMetrics {
    /// Completed iterations.
    pub completed: u64,
    /// Iterations interrupted by the hard stop.
    pub interrupted: u64,
    /// Dropped arrival-rate iterations.
    pub dropped: u64,
    /// Iterations the arrival-rate scenarios planned over their full duration.
    pub planned: u64,
    /// Completed iterations per second.
    pub rate_per_sec: f64,
    /// Duration P50 in milliseconds.
    pub p50_ms: u64,
    /// Duration P95 in milliseconds.
    pub p95_ms: u64,
    /// Duration P99 in milliseconds.
    pub p99_ms: u64,
    /// Mean duration in milliseconds.
    pub mean_ms: f64,
    /// Longest duration in milliseconds.
    pub max_ms: u64,
}

/// Per-endpoint metrics.
#[derive(Debug, Serialize)]
pub struct EndpointReportMetrics {
    /// Total requests.
    pub total_requests: u64,
    /// Successful requests.
    pub success_count: u64,
    /// Failed requests.
    pub error_count: u64,
    /// Error rate as a fraction.
    pub error_rate: f64,
    /// Success P50 in milliseconds.
    pub p50_ms: u64,
    /// Success P95 in milliseconds.
    pub p95_ms: u64,
    /// Success P99 in milliseconds.
    pub p99_ms: u64,
    /// Minimum latency in milliseconds.
    pub min_ms: u64,
    /// Maximum latency in milliseconds.
    pub max_ms: u64,
    /// Mean latency in milliseconds.
    pub mean_ms: f64,
    /// Error counts by classification.
    pub errors: HashMap<String, u64>,
}

impl LoadTestReport {
    /// Build a report from load test results and the resolved config.
    pub fn from_result(result: &LoadTestResult, config: &LoadTestConfig) -> Self {
        let snap = &result.snapshot;
        let elapsed = result.elapsed;

        let checks = snap
            .checks
            .iter()
            .map(|c| CheckReport {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
                rate: c.rate(),
            })
            .collect();

        let per_endpoint = snap
            .per_endpoint
            .iter()
            .map(|ep| {
                (
                    ep.endpoint.to_string(),
                    EndpointReportMetrics {
                        total_requests: ep.total_requests,
                        success_count: ep.success_count,
                        error_count: ep.error_count,
                        error_rate: ep.error_rate,
                        p50_ms: ep.p50,
                        p95_ms: ep.p95,
                        p99_ms: ep.p99,
                        min_ms: ep.min,
                        max_ms: ep.max,
                        mean_ms: ep.mean,
                        errors: ep.error_categories.clone(),
                    },
                )
            })
            .collect();

        let it = &snap.iterations;
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            target_url: config.settings.base_url.clone(),
            duration_secs: elapsed.as_secs_f64(),
            peak_vus: result.peak_vus,
            config: serde_json::to_value(config).unwrap_or(serde_json::Value::Null),
            checks,
            http: HttpMetrics {
                total_requests: snap.total_requests,
                success_count: snap.success_count,
                error_count: snap.error_count,
                error_rate: snap.error_rate,
                throughput_rps: snap.requests_per_sec(elapsed),
                latency: LatencyMetrics {
                    p50_ms: snap.p50,
                    p95_ms: snap.p95,
                    p99_ms: snap.p99,
                    error_p50_ms: snap.error_p50,
                    error_p95_ms: snap.error_p95,
                    error_p99_ms: snap.error_p99,
                },
                errors: snap.error_category_counts.clone(),
            },
            iterations: IterationMetrics {
                completed: it.completed,
                interrupted: it.interrupted,
                dropped: it.dropped,
                planned: config.planned_iterations(),
                rate_per_sec: snap.iterations_per_sec(elapsed),
                p50_ms: it.p50,
                p95_ms: it.p95,
                p99_ms: it.p99,
                mean_ms: it.mean,
                max_ms: it.max,
            },
            per_endpoint,
            thresholds: result.thresholds.clone(),
            thresholds_passed: result.thresholds_passed(),
        }
    }
}

/// Write a JSON report under `base_dir`/[`REPORTS_DIR`].
///
/// Creates the directory if needed. The filename is timestamped with
/// hyphens instead of colons so it is valid on Windows.
pub fn write_report(report: &LoadTestReport, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let reports_dir = base_dir.join(REPORTS_DIR);
    std::fs::create_dir_all(&reports_dir)?;

    let report_path = reports_dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    Ok(report_path)
}

/// Report filename for a given timestamp.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("loadtest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::checks::CheckOutcome;
    use crate::loadtest::client::Endpoint;
    use crate::loadtest::metrics::{IterationStatus, MetricEvent, MetricsRecorder, RequestSample};
    use crate::loadtest::presets;
    use chrono::TimeZone;
    use std::time::Duration;

    fn sample_result() -> LoadTestResult {
        let mut recorder = MetricsRecorder::new(10_000);
        for _ in 0..3 {
            recorder.record(&MetricEvent::Request(RequestSample::success(
                Endpoint::DummyLogin,
                Duration::from_millis(20),
            )));
            recorder.record(&MetricEvent::Check(CheckOutcome::new("dummyLogin 200", true)));
            recorder.record(&MetricEvent::Iteration {
                duration: Duration::from_millis(60),
                status: IterationStatus::Completed,
            });
        }
        LoadTestResult {
            snapshot: recorder.snapshot(),
            elapsed: Duration::from_secs(3),
            peak_vus: 4,
            thresholds: vec![ThresholdResult {
                name: "checks_rate".to_string(),
                condition: "rate>=0.99".to_string(),
                actual: "1.0000".to_string(),
                passed: true,
            }],
        }
    }

    #[test]
    fn test_report_serializes_expected_fields() {
        let config = presets::preset("moderate_load").unwrap();
        let report = LoadTestReport::from_result(&sample_result(), &config);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["schema_version"], SCHEMA_VERSION);
        assert_eq!(json["target_url"], "http://localhost:8080");
        assert_eq!(json["peak_vus"], 4);
        assert_eq!(json["checks"][0]["name"], "dummyLogin 200");
        assert_eq!(json["checks"][0]["passes"], 3);
        assert_eq!(json["http"]["total_requests"], 3);
        assert_eq!(json["http"]["throughput_rps"], 1.0);
        assert_eq!(json["iterations"]["completed"], 3);
        assert_eq!(json["iterations"]["dropped"], 0);
        assert_eq!(json["iterations"]["planned"], 1500);
        assert_eq!(json["per_endpoint"]["POST /dummyLogin"]["p50_ms"], 20);
        assert_eq!(json["thresholds_passed"], true);
        assert_eq!(json["config"]["scenario"][0]["name"], "moderate_load");
        assert_eq!(
            json["config"]["scenario"][0]["executor"]["type"],
            "constant-arrival-rate"
        );
    }

    #[test]
    fn test_report_filename_has_no_colons() {
        let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(report_filename(&ts), "loadtest-2026-03-01T12-30-05.json");
    }

    #[test]
    fn test_write_report_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = presets::preset("dual_role_ramp").unwrap();
        let report = LoadTestReport::from_result(&sample_result(), &config);

        let path = write_report(&report, dir.path()).unwrap();
        assert!(path.starts_with(dir.path().join(REPORTS_DIR)));

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["config"]["scenario"][0]["flow"], "dual-role");
    }
}

//! Pass/fail evaluation of `[thresholds]` against the final snapshot.

use serde::Serialize;

use crate::loadtest::config::Thresholds;
use crate::loadtest::metrics::MetricsSnapshot;

/// Process exit code used when at least one threshold fails.
pub const THRESHOLD_FAILED_EXIT_CODE: i32 = 99;

/// Outcome of one configured threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    /// Threshold key as written in the config file.
    pub name: String,
    /// Human-readable condition, e.g. `rate>=0.99`.
    pub condition: String,
    /// Observed value, formatted.
    pub actual: String,
    /// Whether the condition held.
    pub passed: bool,
}

/// Returns `true` when every result passed (vacuously true when empty).
pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

/// Evaluates every configured threshold, in declaration order.
///
/// `checks_rate` passes when no check ran at all: there is nothing to fail.
pub fn evaluate(thresholds: &Thresholds, snap: &MetricsSnapshot) -> Vec<ThresholdResult> {
    let mut results = Vec::new();

    if let Some(min) = thresholds.checks_rate {
        let (passed, actual) = match snap.checks_rate() {
            Some(rate) => (rate >= min, format!("{rate:.4}")),
            None => (true, "no checks".to_string()),
        };
        results.push(ThresholdResult {
            name: "checks_rate".to_string(),
            condition: format!("rate>={min}"),
            actual,
            passed,
        });
    }

    if let Some(max) = thresholds.http_req_failed_rate {
        results.push(ThresholdResult {
            name: "http_req_failed_rate".to_string(),
            condition: format!("rate<={max}"),
            actual: format!("{:.4}", snap.error_rate),
            passed: snap.error_rate <= max,
        });
    }

    if let Some(max) = thresholds.http_req_duration_p95_ms {
        results.push(latency("http_req_duration_p95_ms", "p(95)", snap.p95, max));
    }

    if let Some(max) = thresholds.http_req_duration_p99_ms {
        results.push(latency("http_req_duration_p99_ms", "p(99)", snap.p99, max));
    }

    if let Some(max) = thresholds.dropped_iterations {
        results.push(ThresholdResult {
            name: "dropped_iterations".to_string(),
            condition: format!("count<={max}"),
            actual: snap.iterations.dropped.to_string(),
            passed: snap.iterations.dropped <= max,
        });
    }

    results
}

fn latency(name: &str, label: &str, actual: u64, max: u64) -> ThresholdResult {
    ThresholdResult {
        name: name.to_string(),
        condition: format!("{label}<={max}ms"),
        actual: format!("{actual}ms"),
        passed: actual <= max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::checks::CheckOutcome;
    use crate::loadtest::client::Endpoint;
    use crate::loadtest::error::RequestError;
    use crate::loadtest::metrics::{MetricEvent, MetricsRecorder, RequestSample};
    use std::time::Duration;

    fn snapshot(passes: usize, fails: usize, errors: usize, dropped: usize) -> MetricsSnapshot {
        let mut recorder = MetricsRecorder::new(10_000);
        for _ in 0..passes {
            recorder.record(&MetricEvent::Check(CheckOutcome::new("dummyLogin 200", true)));
            recorder.record(&MetricEvent::Request(RequestSample::success(
                Endpoint::DummyLogin,
                Duration::from_millis(50),
            )));
        }
        for _ in 0..fails {
            recorder.record(&MetricEvent::Check(CheckOutcome::new("dummyLogin 200", false)));
        }
        for _ in 0..errors {
            recorder.record(&MetricEvent::Request(RequestSample::error(
                Endpoint::DummyLogin,
                Duration::from_millis(50),
                RequestError::Timeout,
            )));
        }
        for _ in 0..dropped {
            recorder.record(&MetricEvent::Dropped);
        }
        recorder.snapshot()
    }

    #[test]
    fn test_empty_thresholds_yield_no_results() {
        let results = evaluate(&Thresholds::default(), &snapshot(1, 0, 0, 0));
        assert!(results.is_empty());
        assert!(all_passed(&results));
    }

    #[test]
    fn test_checks_rate_threshold() {
        let thresholds = Thresholds {
            checks_rate: Some(0.9),
            ..Thresholds::default()
        };
        assert!(all_passed(&evaluate(&thresholds, &snapshot(9, 1, 0, 0))));

        let results = evaluate(&thresholds, &snapshot(8, 2, 0, 0));
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(results[0].name, "checks_rate");
    }

    #[test]
    fn test_checks_rate_passes_without_checks() {
        let thresholds = Thresholds {
            checks_rate: Some(1.0),
            ..Thresholds::default()
        };
        let results = evaluate(&thresholds, &snapshot(0, 0, 0, 0));
        assert!(results[0].passed);
        assert_eq!(results[0].actual, "no checks");
    }

    #[test]
    fn test_failed_rate_and_latency_thresholds() {
        let thresholds = Thresholds {
            http_req_failed_rate: Some(0.1),
            http_req_duration_p95_ms: Some(40),
            http_req_duration_p99_ms: Some(100),
            ..Thresholds::default()
        };
        let results = evaluate(&thresholds, &snapshot(10, 0, 5, 0));
        assert_eq!(results.len(), 3);
        assert!(!results[0].passed, "5/15 failed exceeds 10%");
        assert!(!results[1].passed, "p95 50ms exceeds 40ms");
        assert!(results[2].passed, "p99 50ms within 100ms");
        assert!(!all_passed(&results));
    }

    #[test]
    fn test_dropped_iterations_threshold() {
        let thresholds = Thresholds {
            dropped_iterations: Some(0),
            ..Thresholds::default()
        };
        assert!(all_passed(&evaluate(&thresholds, &snapshot(1, 0, 0, 0))));
        let results = evaluate(&thresholds, &snapshot(1, 0, 0, 3));
        assert!(!results[0].passed);
        assert_eq!(results[0].actual, "3");
    }
}

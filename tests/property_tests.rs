//! Property-based tests for ramp interpolation and metrics invariants.

use proptest::prelude::*;
use std::time::Duration;

use pvz_loadtest::loadtest::checks::CheckOutcome;
use pvz_loadtest::loadtest::client::Endpoint;
use pvz_loadtest::loadtest::config::{ArrivalRate, RampingVus, Stage};
use pvz_loadtest::loadtest::error::RequestError;
use pvz_loadtest::loadtest::metrics::{
    IterationStatus, MetricEvent, MetricsRecorder, RequestSample,
};

fn arb_ramp() -> impl Strategy<Value = RampingVus> {
    (
        0u32..50,
        prop::collection::vec((1u64..60_000, 0u32..200), 1..6),
    )
        .prop_map(|(start_vus, stages)| RampingVus {
            start_vus,
            stages: stages
                .into_iter()
                .map(|(ms, target)| Stage {
                    duration: Duration::from_millis(ms),
                    target,
                })
                .collect(),
        })
}

const CHECK_NAMES: [&str; 3] = ["dummyLogin 200", "CreatePVZ 201", "AddProduct 201"];

proptest! {
    /// The interpolated VU count never leaves the range spanned by
    /// `start_vus` and the stage targets.
    #[test]
    fn vus_at_stays_within_targets(ramp in arb_ramp(), at_ms in 0u64..400_000) {
        let vus = ramp.vus_at(Duration::from_millis(at_ms));
        let min = ramp.stages.iter().map(|s| s.target).min().unwrap_or(0).min(ramp.start_vus);
        prop_assert!(vus >= min, "vus {} below min {}", vus, min);
        prop_assert!(vus <= ramp.max_target(), "vus {} above max {}", vus, ramp.max_target());
    }

    /// At the end of the ramp the last target holds.
    #[test]
    fn vus_at_settles_on_last_target(ramp in arb_ramp(), extra_ms in 0u64..10_000) {
        let end = ramp.total_duration() + Duration::from_millis(extra_ms);
        let last = ramp.stages.last().map(|s| s.target).unwrap_or(ramp.start_vus);
        prop_assert_eq!(ramp.vus_at(end), last);
    }

    /// Within one stage the VU count moves monotonically toward its target.
    #[test]
    fn vus_at_monotonic_within_single_stage(
        start in 0u32..100,
        target in 0u32..100,
        secs in 1u64..120,
        a in 0u64..1000,
        b in 0u64..1000,
    ) {
        let ramp = RampingVus {
            start_vus: start,
            stages: vec![Stage { duration: Duration::from_secs(secs), target }],
        };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let total = Duration::from_secs(secs);
        let v_lo = ramp.vus_at(total.mul_f64(lo as f64 / 1000.0));
        let v_hi = ramp.vus_at(total.mul_f64(hi as f64 / 1000.0));
        if target >= start {
            prop_assert!(v_lo <= v_hi);
        } else {
            prop_assert!(v_lo >= v_hi);
        }
    }

    /// The arrival-rate interval times the rate never exceeds the time unit.
    #[test]
    fn arrival_interval_fits_time_unit(rate in 1u32..10_000, unit_ms in 1u64..60_000) {
        let car = ArrivalRate {
            rate,
            time_unit: Duration::from_millis(unit_ms),
            duration: Duration::from_secs(1),
            pre_allocated_vus: 1,
            max_vus: 1,
        };
        prop_assert!(car.interval() * rate <= car.time_unit);
    }

    /// Logical request counts match the recorded samples even when
    /// coordinated-omission correction inflates the histograms.
    #[test]
    fn request_counts_are_logical(
        successes in 0u32..100,
        errors in 0u32..50,
        latency_ms in 1u64..2_000,
    ) {
        let mut recorder = MetricsRecorder::new(10);
        for _ in 0..successes {
            recorder.record(&MetricEvent::Request(RequestSample::success(
                Endpoint::CreatePvz,
                Duration::from_millis(latency_ms),
            )));
        }
        for _ in 0..errors {
            recorder.record(&MetricEvent::Request(RequestSample::error(
                Endpoint::CreatePvz,
                Duration::from_millis(latency_ms),
                RequestError::Timeout,
            )));
        }
        let snap = recorder.snapshot();
        prop_assert_eq!(snap.success_count, u64::from(successes));
        prop_assert_eq!(snap.error_count, u64::from(errors));
        prop_assert_eq!(snap.total_requests, u64::from(successes + errors));
        prop_assert!((0.0..=1.0).contains(&snap.error_rate));
    }

    /// P50 <= P95 <= P99 for any latency distribution.
    #[test]
    fn percentiles_monotonic(latencies in prop::collection::vec(1u64..10_000, 1..200)) {
        let mut recorder = MetricsRecorder::new(10_000);
        for ms in &latencies {
            recorder.record(&MetricEvent::Request(RequestSample::success(
                Endpoint::DummyLogin,
                Duration::from_millis(*ms),
            )));
        }
        let snap = recorder.snapshot();
        prop_assert!(snap.p50 <= snap.p95);
        prop_assert!(snap.p95 <= snap.p99);
    }

    /// Check tallies add up and keep first-seen order.
    #[test]
    fn check_tallies_add_up(outcomes in prop::collection::vec((0usize..3, any::<bool>()), 0..300)) {
        let mut recorder = MetricsRecorder::new(100);
        let mut first_seen: Vec<&str> = Vec::new();
        for (idx, passed) in &outcomes {
            let name = CHECK_NAMES[*idx];
            if !first_seen.contains(&name) {
                first_seen.push(name);
            }
            recorder.record(&MetricEvent::Check(CheckOutcome::new(name, *passed)));
        }
        let snap = recorder.snapshot();

        let names: Vec<&str> = snap.checks.iter().map(|c| c.name.as_str()).collect();
        prop_assert_eq!(names, first_seen);
        prop_assert_eq!(snap.checks_passed() + snap.checks_failed(), outcomes.len() as u64);
        let passed = outcomes.iter().filter(|(_, p)| *p).count() as u64;
        prop_assert_eq!(snap.checks_passed(), passed);
        match snap.checks_rate() {
            Some(rate) => prop_assert!((0.0..=1.0).contains(&rate)),
            None => prop_assert!(outcomes.is_empty()),
        }
    }

    /// Iteration counters track each status independently.
    #[test]
    fn iteration_counters(completed in 0u32..50, interrupted in 0u32..50, dropped in 0u32..50) {
        let mut recorder = MetricsRecorder::new(100);
        for _ in 0..completed {
            recorder.record(&MetricEvent::Iteration {
                duration: Duration::from_millis(30),
                status: IterationStatus::Completed,
            });
        }
        for _ in 0..interrupted {
            recorder.record(&MetricEvent::Iteration {
                duration: Duration::from_millis(30),
                status: IterationStatus::Interrupted,
            });
        }
        for _ in 0..dropped {
            recorder.record(&MetricEvent::Dropped);
        }
        let it = recorder.snapshot().iterations;
        prop_assert_eq!(it.completed, u64::from(completed));
        prop_assert_eq!(it.interrupted, u64::from(interrupted));
        prop_assert_eq!(it.dropped, u64::from(dropped));
    }
}

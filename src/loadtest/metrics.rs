//! HdrHistogram-based metrics pipeline with coordinated omission correction.
//!
//! [`MetricsRecorder`] ingests [`MetricEvent`] values sent by virtual users:
//! request samples, check outcomes and iteration lifecycle events. Request
//! latencies go into separate success/error histograms, globally and per
//! [`Endpoint`]. Coordinated omission correction is applied at recording time
//! via [`hdrhistogram::Histogram::record_correct`].
//!
//! # Design
//!
//! - **Single-owner**: no `Arc<Mutex>`. One aggregator task owns the recorder
//!   and drains an mpsc channel.
//! - **Separate buckets**: error spikes don't pollute success percentiles.
//! - **Logical counts**: request totals count one per sample. Synthetic
//!   fill-ins from correction only influence percentiles.
//! - **Millisecond resolution**.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;

use crate::loadtest::checks::CheckOutcome;
use crate::loadtest::client::{Endpoint, RequestOutcome};
use crate::loadtest::error::RequestError;

/// A single request measurement sample.
#[derive(Debug, Clone)]
pub struct RequestSample {
    /// Endpoint that was called.
    pub endpoint: Endpoint,
    /// Wall-clock duration of the request.
    pub duration: Duration,
    /// `Ok(())` for success, `Err` for transport failures and 4xx/5xx.
    pub result: Result<(), RequestError>,
    /// When the sample was taken.
    pub timestamp: Instant,
}

impl RequestSample {
    /// Create a success sample with the current timestamp.
    pub fn success(endpoint: Endpoint, duration: Duration) -> Self {
        Self {
            endpoint,
            duration,
            result: Ok(()),
            timestamp: Instant::now(),
        }
    }

    /// Create an error sample with the current timestamp.
    pub fn error(endpoint: Endpoint, duration: Duration, err: RequestError) -> Self {
        Self {
            endpoint,
            duration,
            result: Err(err),
            timestamp: Instant::now(),
        }
    }

    /// Build a sample from a client call.
    pub fn from_outcome(outcome: &RequestOutcome) -> Self {
        match outcome.failure() {
            None => Self::success(outcome.endpoint, outcome.duration),
            Some(err) => Self::error(outcome.endpoint, outcome.duration, err),
        }
    }
}

/// How an iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStatus {
    /// Ran every step.
    Completed,
    /// Cut short when the graceful stop window ran out.
    Interrupted,
}

/// Everything a virtual user reports to the aggregator.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    /// One HTTP request.
    Request(RequestSample),
    /// One named check.
    Check(CheckOutcome),
    /// An iteration finished or was interrupted.
    Iteration {
        /// Iteration wall-clock duration.
        duration: Duration,
        /// How it ended.
        status: IterationStatus,
    },
    /// An arrival-rate tick found no free VU.
    Dropped,
}

/// Per-endpoint metrics snapshot with latency percentiles and error breakdown.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    /// Endpoint being described.
    pub endpoint: Endpoint,
    /// Success latency P50 (milliseconds).
    pub p50: u64,
    /// Success latency P95 (milliseconds).
    pub p95: u64,
    /// Success latency P99 (milliseconds).
    pub p99: u64,
    /// Minimum latency across all requests (milliseconds).
    pub min: u64,
    /// Maximum latency across all requests (milliseconds).
    pub max: u64,
    /// Mean latency across all requests (milliseconds).
    pub mean: f64,
    /// Total requests for this endpoint.
    pub total_requests: u64,
    /// Successful requests.
    pub success_count: u64,
    /// Failed requests.
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Error counts by classification for this endpoint.
    pub error_categories: HashMap<String, u64>,
}

/// Pass/fail tally for one check name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTally {
    /// Check name.
    pub name: String,
    /// Times the check passed.
    pub passes: u64,
    /// Times the check failed.
    pub fails: u64,
}

impl CheckTally {
    /// Total evaluations.
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Pass fraction, 0.0 when never evaluated.
    pub fn rate(&self) -> f64 {
        ratio(self.passes, self.total())
    }
}

/// Iteration counters and duration percentiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    /// Iterations that ran to completion.
    pub completed: u64,
    /// Iterations cut short by the hard stop.
    pub interrupted: u64,
    /// Arrival-rate ticks that found no free VU.
    pub dropped: u64,
    /// Iteration duration P50 (milliseconds).
    pub p50: u64,
    /// Iteration duration P95 (milliseconds).
    pub p95: u64,
    /// Iteration duration P99 (milliseconds).
    pub p99: u64,
    /// Mean iteration duration (milliseconds).
    pub mean: f64,
    /// Longest iteration (milliseconds).
    pub max: u64,
}

/// Point-in-time snapshot of all metrics state.
///
/// All percentile values are in milliseconds.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Success latency P50.
    pub p50: u64,
    /// Success latency P95.
    pub p95: u64,
    /// Success latency P99.
    pub p99: u64,
    /// Error latency P50.
    pub error_p50: u64,
    /// Error latency P95.
    pub error_p95: u64,
    /// Error latency P99.
    pub error_p99: u64,
    /// Successful requests.
    pub success_count: u64,
    /// Failed requests.
    pub error_count: u64,
    /// All requests.
    pub total_requests: u64,
    /// Fraction of requests that failed (0.0..=1.0).
    pub error_rate: f64,
    /// Error counts by classification (http, timeout, connection, decode).
    pub error_category_counts: HashMap<String, u64>,
    /// Per-endpoint metrics in endpoint declaration order.
    pub per_endpoint: Vec<EndpointSnapshot>,
    /// Check tallies in the order each name was first seen.
    pub checks: Vec<CheckTally>,
    /// Iteration counters.
    pub iterations: IterationStats,
}

impl MetricsSnapshot {
    /// Checks passed across all names.
    pub fn checks_passed(&self) -> u64 {
        self.checks.iter().map(|c| c.passes).sum()
    }

    /// Checks failed across all names.
    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    /// Fraction of passing checks, or `None` if no check ran.
    pub fn checks_rate(&self) -> Option<f64> {
        let total = self.checks_passed() + self.checks_failed();
        (total > 0).then(|| ratio(self.checks_passed(), total))
    }

    /// Completed iterations per second over `elapsed`.
    pub fn iterations_per_sec(&self, elapsed: Duration) -> f64 {
        per_sec(self.iterations.completed, elapsed)
    }

    /// Requests per second over `elapsed`.
    pub fn requests_per_sec(&self, elapsed: Duration) -> f64 {
        per_sec(self.total_requests, elapsed)
    }
}

fn per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn new_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

fn quantile(histogram: &Histogram<u64>, q: f64) -> u64 {
    if histogram.is_empty() {
        0
    } else {
        histogram.value_at_quantile(q)
    }
}

/// Success/error histogram pair plus logical counters.
struct LatencyBuckets {
    success_histogram: Histogram<u64>,
    error_histogram: Histogram<u64>,
    total_success: u64,
    total_errors: u64,
    error_category_counts: HashMap<String, u64>,
}

impl LatencyBuckets {
    fn new() -> Self {
        Self {
            success_histogram: new_histogram(),
            error_histogram: new_histogram(),
            total_success: 0,
            total_errors: 0,
            error_category_counts: HashMap::new(),
        }
    }

    fn record(&mut self, sample: &RequestSample, expected_interval_ms: u64) {
        let ms = sample.duration.as_millis() as u64;
        match &sample.result {
            Ok(()) => {
                let _ = self
                    .success_histogram
                    .record_correct(ms, expected_interval_ms);
                self.total_success += 1;
            },
            Err(err) => {
                let _ = self.error_histogram.record_correct(ms, expected_interval_ms);
                self.total_errors += 1;
                *self
                    .error_category_counts
                    .entry(err.error_category().to_owned())
                    .or_insert(0) += 1;
            },
        }
    }

    fn total(&self) -> u64 {
        self.total_success + self.total_errors
    }

    /// Min/max/mean across both histograms.
    fn spread(&self) -> (u64, u64, f64) {
        let ok = &self.success_histogram;
        let err = &self.error_histogram;
        match (ok.is_empty(), err.is_empty()) {
            (false, false) => {
                let (ok_n, err_n) = (ok.len() as f64, err.len() as f64);
                let mean = (ok.mean() * ok_n + err.mean() * err_n) / (ok_n + err_n);
                (ok.min().min(err.min()), ok.max().max(err.max()), mean)
            },
            (false, true) => (ok.min(), ok.max(), ok.mean()),
            (true, false) => (err.min(), err.max(), err.mean()),
            (true, true) => (0, 0, 0.0),
        }
    }
}

/// HdrHistogram-backed metrics recorder.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use pvz_loadtest::loadtest::client::Endpoint;
/// use pvz_loadtest::loadtest::metrics::{MetricEvent, MetricsRecorder, RequestSample};
///
/// let mut recorder = MetricsRecorder::new(100);
/// let sample = RequestSample::success(Endpoint::DummyLogin, Duration::from_millis(42));
/// recorder.record(&MetricEvent::Request(sample));
///
/// assert_eq!(recorder.snapshot().success_count, 1);
/// assert_eq!(recorder.p50(), 42);
/// ```
pub struct MetricsRecorder {
    expected_interval_ms: u64,
    overall: LatencyBuckets,
    per_endpoint: BTreeMap<Endpoint, LatencyBuckets>,
    checks: Vec<CheckTally>,
    check_index: HashMap<&'static str, usize>,
    iteration_histogram: Histogram<u64>,
    completed: u64,
    interrupted: u64,
    dropped: u64,
}

impl MetricsRecorder {
    /// Create a new recorder with the given expected request interval.
    ///
    /// The `expected_interval_ms` is used for coordinated omission correction:
    /// when a request takes much longer than expected, synthetic samples are
    /// filled in for requests that *would have* been sent during the stall.
    pub fn new(expected_interval_ms: u64) -> Self {
        Self {
            expected_interval_ms,
            overall: LatencyBuckets::new(),
            per_endpoint: BTreeMap::new(),
            checks: Vec::new(),
            check_index: HashMap::new(),
            iteration_histogram: new_histogram(),
            completed: 0,
            interrupted: 0,
            dropped: 0,
        }
    }

    /// Ingest one event.
    pub fn record(&mut self, event: &MetricEvent) {
        match event {
            MetricEvent::Request(sample) => self.record_request(sample),
            MetricEvent::Check(check) => self.record_check(check),
            MetricEvent::Iteration { duration, status } => match status {
                IterationStatus::Completed => {
                    let _ = self
                        .iteration_histogram
                        .record(duration.as_millis() as u64);
                    self.completed += 1;
                },
                IterationStatus::Interrupted => self.interrupted += 1,
            },
            MetricEvent::Dropped => self.dropped += 1,
        }
    }

    fn record_request(&mut self, sample: &RequestSample) {
        self.overall.record(sample, self.expected_interval_ms);
        self.per_endpoint
            .entry(sample.endpoint)
            .or_insert_with(LatencyBuckets::new)
            .record(sample, self.expected_interval_ms);
    }

    fn record_check(&mut self, check: &CheckOutcome) {
        let idx = *self.check_index.entry(check.name).or_insert_with(|| {
            self.checks.push(CheckTally {
                name: check.name.to_string(),
                passes: 0,
                fails: 0,
            });
            self.checks.len() - 1
        });
        let tally = &mut self.checks[idx];
        if check.passed {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
    }

    /// Success latency P50 in milliseconds. Returns 0 if no samples recorded.
    pub fn p50(&self) -> u64 {
        quantile(&self.overall.success_histogram, 0.50)
    }

    /// Success latency P95 in milliseconds. Returns 0 if no samples recorded.
    pub fn p95(&self) -> u64 {
        quantile(&self.overall.success_histogram, 0.95)
    }

    /// Success latency P99 in milliseconds. Returns 0 if no samples recorded.
    pub fn p99(&self) -> u64 {
        quantile(&self.overall.success_histogram, 0.99)
    }

    /// Requests recorded for one endpoint.
    pub fn endpoint_count(&self, endpoint: Endpoint) -> u64 {
        self.per_endpoint.get(&endpoint).map_or(0, LatencyBuckets::total)
    }

    /// Capture a point-in-time snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_endpoint = self
            .per_endpoint
            .iter()
            .map(|(endpoint, buckets)| {
                let (min, max, mean) = buckets.spread();
                EndpointSnapshot {
                    endpoint: *endpoint,
                    p50: quantile(&buckets.success_histogram, 0.50),
                    p95: quantile(&buckets.success_histogram, 0.95),
                    p99: quantile(&buckets.success_histogram, 0.99),
                    min,
                    max,
                    mean,
                    total_requests: buckets.total(),
                    success_count: buckets.total_success,
                    error_count: buckets.total_errors,
                    error_rate: ratio(buckets.total_errors, buckets.total()),
                    error_categories: buckets.error_category_counts.clone(),
                }
            })
            .collect();

        let iter_hist = &self.iteration_histogram;
        let iterations = IterationStats {
            completed: self.completed,
            interrupted: self.interrupted,
            dropped: self.dropped,
            p50: quantile(iter_hist, 0.50),
            p95: quantile(iter_hist, 0.95),
            p99: quantile(iter_hist, 0.99),
            mean: if iter_hist.is_empty() { 0.0 } else { iter_hist.mean() },
            max: if iter_hist.is_empty() { 0 } else { iter_hist.max() },
        };

        let total = self.overall.total();
        MetricsSnapshot {
            p50: self.p50(),
            p95: self.p95(),
            p99: self.p99(),
            error_p50: quantile(&self.overall.error_histogram, 0.50),
            error_p95: quantile(&self.overall.error_histogram, 0.95),
            error_p99: quantile(&self.overall.error_histogram, 0.99),
            success_count: self.overall.total_success,
            error_count: self.overall.total_errors,
            total_requests: total,
            error_rate: ratio(self.overall.total_errors, total),
            error_category_counts: self.overall.error_category_counts.clone(),
            per_endpoint,
            checks: self.checks.clone(),
            iterations,
        }
    }
}

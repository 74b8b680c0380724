//! Load test execution engine with metrics aggregation and graceful shutdown.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Runs every configured scenario's executor concurrently
//! - Collects [`MetricEvent`] values through one bounded mpsc channel
//! - Publishes snapshots through a watch channel for the live display
//! - Drains in-flight iterations within the graceful stop window, then
//!   interrupts whatever is left

use crate::loadtest::client::PvzClient;
use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::display::display_loop;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::executor::{run_scenario, ExecutorContext};
use crate::loadtest::metrics::{MetricEvent, MetricsRecorder, MetricsSnapshot};
use crate::loadtest::scenario::ScenarioRunner;
use crate::loadtest::thresholds::{self, ThresholdResult};
use crate::loadtest::vu::{ActiveVuCounter, IterationBudget};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<MetricEvent>();
    _assert_send::<MetricsSnapshot>();
    _assert_send::<DisplayState>();
}

/// Display state published through the watch channel to the live display.
#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Current metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Current stage label for ramping scenarios.
    pub stage_label: Option<String>,
}

/// Top-level load test engine configuration and entry point.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    max_iterations: Option<u64>,
    no_color: bool,
    live_display: bool,
}

impl LoadTestEngine {
    /// Creates a new engine for the given configuration.
    pub fn new(config: LoadTestConfig) -> Self {
        Self {
            config,
            max_iterations: None,
            no_color: false,
            live_display: true,
        }
    }

    /// Sets an iteration limit. The test stops after this many total iterations
    /// across all scenarios (first-limit-wins with duration).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Enables or disables the live progress line.
    pub fn with_live_display(mut self, enabled: bool) -> Self {
        self.live_display = enabled;
        self
    }

    /// Returns a reference to the engine's configuration.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Returns the configured max iterations, if any.
    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    /// Returns whether colored output is disabled.
    pub fn no_color(&self) -> bool {
        self.no_color
    }

    /// Run the load test to completion and evaluate thresholds.
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        self.config.validate()?;

        let run = CancellationToken::new();
        let hard_stop = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active_vus = ActiveVuCounter::new();
        let budget = self
            .max_iterations
            .map(|n| IterationBudget::new(n, run.clone()));
        let client = PvzClient::new(
            reqwest::Client::new(),
            self.config.settings.base_url.clone(),
            self.config.timeout(),
        );

        let buffer_size = (self.config.total_max_vus().max(1) as usize) * 100;
        let (sample_tx, sample_rx) = mpsc::channel::<MetricEvent>(buffer_size);
        let expected_interval_ms = self.config.settings.expected_interval_ms;
        let (display_tx, display_rx) = watch::channel(DisplayState {
            snapshot: MetricsRecorder::new(expected_interval_ms).snapshot(),
            stage_label: None,
        });
        let stage_label = Arc::new(Mutex::new(None::<String>));

        // Aggregator is not on the tracker: it must outlive every VU task.
        let aggregator_handle = tokio::spawn(metrics_aggregator(
            sample_rx,
            display_tx,
            expected_interval_ms,
            stage_label.clone(),
        ));

        let test_start = Instant::now();
        let display_done = CancellationToken::new();
        let display_handle = self.live_display.then(|| {
            tokio::spawn(display_loop(
                display_rx.clone(),
                active_vus.clone(),
                self.config.total_max_vus(),
                display_done.clone(),
                self.no_color,
                test_start,
            ))
        });
        let ctrl_c_handle = tokio::spawn(handle_ctrl_c(run.clone(), hard_stop.clone()));

        let mut executors = JoinSet::new();
        for scenario in &self.config.scenario {
            let ctx = ExecutorContext {
                runner: Arc::new(ScenarioRunner::from_config(client.clone(), scenario)),
                sample_tx: sample_tx.clone(),
                run: run.clone(),
                hard_stop: hard_stop.clone(),
                tracker: tracker.clone(),
                active_vus: active_vus.clone(),
                budget: budget.clone(),
                stage_label: stage_label.clone(),
            };
            executors.spawn(run_scenario(scenario.clone(), ctx));
        }
        // VUs and executors hold their own clones.
        drop(sample_tx);

        // Keep draining on failure so VUs and the aggregator shut down cleanly.
        let executor_result = join_executors(executors, &run).await;
        run.cancel();

        tracker.close();
        let graceful_stop = self.config.settings.graceful_stop;
        if tokio::time::timeout(graceful_stop, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                graceful_stop_ms = graceful_stop.as_millis() as u64,
                in_flight = active_vus.get(),
                "graceful stop expired, interrupting in-flight iterations"
            );
            hard_stop.cancel();
            tracker.wait().await;
        }
        let elapsed = test_start.elapsed();

        // Aggregator exits once every sender is gone.
        let _ = aggregator_handle.await;
        display_done.cancel();
        if let Some(handle) = display_handle {
            let _ = handle.await;
        }
        ctrl_c_handle.abort();

        executor_result?;

        let snapshot = display_rx.borrow().snapshot.clone();
        let thresholds = thresholds::evaluate(&self.config.thresholds, &snapshot);

        Ok(LoadTestResult {
            snapshot,
            elapsed,
            peak_vus: active_vus.peak(),
            thresholds,
        })
    }
}

/// Result of a completed load test run.
#[derive(Debug, Clone)]
pub struct LoadTestResult {
    /// Final metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Total elapsed time, including the graceful drain.
    pub elapsed: Duration,
    /// Highest number of simultaneously active VUs.
    pub peak_vus: u32,
    /// Threshold outcomes in declaration order.
    pub thresholds: Vec<ThresholdResult>,
}

impl LoadTestResult {
    /// `true` when no threshold failed.
    pub fn thresholds_passed(&self) -> bool {
        thresholds::all_passed(&self.thresholds)
    }
}

/// Metrics aggregator task.
///
/// Consumes [`MetricEvent`] values from the mpsc channel and publishes a
/// [`DisplayState`] via the watch channel every 2 seconds. Runs until every
/// sender is dropped, so samples from iterations finishing during the
/// graceful stop window are still counted. Publishes the final snapshot
/// before returning.
///
/// Uses `biased;` select so the tick branch is checked first, preventing
/// display starvation when the channel is busy.
async fn metrics_aggregator(
    mut sample_rx: mpsc::Receiver<MetricEvent>,
    display_tx: watch::Sender<DisplayState>,
    expected_interval_ms: u64,
    stage_label: Arc<Mutex<Option<String>>>,
) {
    let mut recorder = MetricsRecorder::new(expected_interval_ms);
    let mut tick = tokio::time::interval(Duration::from_secs(2));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let publish = |recorder: &MetricsRecorder| {
        let label = stage_label.lock().ok().and_then(|l| l.clone());
        let _ = display_tx.send(DisplayState {
            snapshot: recorder.snapshot(),
            stage_label: label,
        });
    };

    loop {
        tokio::select! {
            biased;

            _ = tick.tick() => {
                while let Ok(event) = sample_rx.try_recv() {
                    recorder.record(&event);
                }
                publish(&recorder);
            }
            result = sample_rx.recv() => {
                match result {
                    Some(event) => recorder.record(&event),
                    None => {
                        publish(&recorder);
                        break;
                    },
                }
            }
        }
    }
}

/// Waits for every scenario executor.
///
/// The first executor failure cancels `run`, so the remaining executors stop
/// starting iterations. That failure is returned once all have finished.
async fn join_executors(
    mut executors: JoinSet<()>,
    run: &CancellationToken,
) -> Result<(), LoadTestError> {
    let mut failure = None;
    while let Some(joined) = executors.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "scenario executor failed");
            run.cancel();
            failure.get_or_insert(err);
        }
    }
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C stops new iterations and lets in-flight ones drain. Second
/// Ctrl+C interrupts them and exits the process.
async fn handle_ctrl_c(run: CancellationToken, hard_stop: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install Ctrl+C handler");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    run.cancel();

    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    eprintln!("\nReceived second Ctrl+C, aborting immediately.");
    hard_stop.cancel();
    std::process::exit(1);
}

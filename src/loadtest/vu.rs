//! Virtual user (VU) task bodies.
//!
//! Two shapes exist. A looping VU ([`vu_loop`]) runs iterations back to back
//! until its own token is cancelled; ramping executors own a set of these. An
//! arrival-rate VU ([`arrival_iteration`]) runs exactly one iteration while
//! holding a concurrency permit. Both report through the same bounded mpsc
//! channel of [`MetricEvent`] values.

use crate::loadtest::metrics::{IterationStatus, MetricEvent};
use crate::loadtest::scenario::ScenarioRunner;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

/// Atomic counter tracking currently active virtual users and the peak.
///
/// Clone-friendly; every clone observes the same counts.
#[derive(Clone, Default)]
pub struct ActiveVuCounter {
    current: Arc<AtomicU32>,
    peak: Arc<AtomicU32>,
}

impl ActiveVuCounter {
    /// Creates a counter initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active VU count by one, updating the peak.
    pub fn increment(&self) {
        let now = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    /// Decrements the active VU count by one.
    pub fn decrement(&self) {
        self.current.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneously active VUs seen so far.
    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Shared cap on the number of iterations started across all VUs.
///
/// The iteration that takes the last slot cancels `exhausted`, so the run
/// drains as soon as the cap is reached (first-limit-wins with duration).
#[derive(Clone)]
pub struct IterationBudget {
    started: Arc<AtomicU64>,
    max: u64,
    exhausted: CancellationToken,
}

impl IterationBudget {
    /// Creates a budget of `max` iterations that cancels `exhausted` when spent.
    pub fn new(max: u64, exhausted: CancellationToken) -> Self {
        Self {
            started: Arc::new(AtomicU64::new(0)),
            max,
            exhausted,
        }
    }

    /// Claims one iteration. Returns `false` once the budget is spent.
    pub fn try_acquire(&self) -> bool {
        let prev = self.started.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= self.max {
            self.exhausted.cancel();
        }
        prev < self.max
    }

    /// Iterations claimed so far, capped at the budget.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed).min(self.max)
    }
}

/// Runs one iteration and forwards its events.
///
/// If `hard_stop` fires first the iteration is abandoned and reported as
/// interrupted. Returns `false` when the aggregator has gone away.
pub async fn execute_iteration(
    runner: &ScenarioRunner,
    sample_tx: &mpsc::Sender<MetricEvent>,
    hard_stop: &CancellationToken,
) -> bool {
    let start = Instant::now();
    tokio::select! {
        biased;

        _ = hard_stop.cancelled() => {
            let event = MetricEvent::Iteration {
                duration: start.elapsed(),
                status: IterationStatus::Interrupted,
            };
            sample_tx.send(event).await.is_ok()
        }
        outcome = runner.run_iteration() => {
            let duration = start.elapsed();
            for event in outcome.into_events() {
                if sample_tx.send(event).await.is_err() {
                    return false;
                }
            }
            let event = MetricEvent::Iteration {
                duration,
                status: IterationStatus::Completed,
            };
            sample_tx.send(event).await.is_ok()
        }
    }
}

/// Looping VU used by the ramping executor.
///
/// Checks `stop` before every iteration; an iteration already running is
/// allowed to finish unless `hard_stop` fires. The `active_vus` counter is
/// incremented on entry and decremented on every exit path.
pub async fn vu_loop(
    vu_id: u32,
    runner: Arc<ScenarioRunner>,
    sample_tx: mpsc::Sender<MetricEvent>,
    stop: CancellationToken,
    hard_stop: CancellationToken,
    budget: Option<IterationBudget>,
    active_vus: ActiveVuCounter,
) {
    active_vus.increment();
    tracing::debug!(vu_id, flow = %runner.flow(), "VU started");

    let mut iterations = 0u64;
    loop {
        if stop.is_cancelled() || hard_stop.is_cancelled() {
            break;
        }
        if let Some(ref budget) = budget {
            if !budget.try_acquire() {
                break;
            }
        }
        if !execute_iteration(&runner, &sample_tx, &hard_stop).await {
            break;
        }
        iterations += 1;
    }

    tracing::debug!(vu_id, iterations, "VU stopped");
    active_vus.decrement();
}

/// Single-iteration VU used by the arrival-rate executor.
///
/// The permit is released when the iteration ends, freeing the slot for the
/// next tick.
pub async fn arrival_iteration(
    runner: Arc<ScenarioRunner>,
    sample_tx: mpsc::Sender<MetricEvent>,
    hard_stop: CancellationToken,
    active_vus: ActiveVuCounter,
    permit: OwnedSemaphorePermit,
) {
    active_vus.increment();
    execute_iteration(&runner, &sample_tx, &hard_stop).await;
    active_vus.decrement();
    drop(permit);
}

//! Executors decide when iterations start.
//!
//! - [`run_constant_arrival_rate`] starts one iteration every
//!   `time_unit / rate`, regardless of how long earlier iterations take.
//!   Concurrency is capped by a semaphore of `max_vus` permits; a tick that
//!   finds no free permit is counted as a dropped iteration.
//! - [`run_ramping_vus`] keeps a pool of looping VUs sized by linear
//!   interpolation between stage targets, re-evaluated every 100ms.
//!
//! Both return once they stop starting new work. In-flight iterations are
//! tracked by the shared [`TaskTracker`] and drained by the engine.

use crate::loadtest::config::{ArrivalRate, Executor, RampingVus, ScenarioConfig};
use crate::loadtest::metrics::MetricEvent;
use crate::loadtest::scenario::ScenarioRunner;
use crate::loadtest::vu::{arrival_iteration, vu_loop, ActiveVuCounter, IterationBudget};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How often the ramping scheduler recomputes its VU target.
pub const RAMP_TICK: Duration = Duration::from_millis(100);

/// Shared handles an executor needs to start iterations.
#[derive(Clone)]
pub struct ExecutorContext {
    /// Scenario runner shared by every VU of this scenario.
    pub runner: Arc<ScenarioRunner>,
    /// Metric event channel.
    pub sample_tx: mpsc::Sender<MetricEvent>,
    /// Run-wide token: once cancelled, no new iteration starts.
    pub run: CancellationToken,
    /// Cancelled when the graceful stop window expires.
    pub hard_stop: CancellationToken,
    /// Tracks every spawned VU task.
    pub tracker: TaskTracker,
    /// Active VU counter shared with the display.
    pub active_vus: ActiveVuCounter,
    /// Optional global iteration cap.
    pub budget: Option<IterationBudget>,
    /// Stage label shown by the live display.
    pub stage_label: Arc<Mutex<Option<String>>>,
}

/// Runs the executor configured for `scenario` to completion.
pub async fn run_scenario(scenario: ScenarioConfig, ctx: ExecutorContext) {
    tracing::info!(
        scenario = %scenario.name,
        flow = %scenario.flow,
        executor = scenario.executor.kind(),
        "scenario started"
    );
    let start = Instant::now();
    match &scenario.executor {
        Executor::ConstantArrivalRate(car) => {
            run_constant_arrival_rate(&scenario.name, car, &ctx).await;
        },
        Executor::RampingVus(ramp) => run_ramping_vus(&scenario.name, ramp, &ctx).await,
    }
    tracing::info!(
        scenario = %scenario.name,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scenario stopped starting iterations"
    );
}

/// Constant-arrival-rate dispatcher.
///
/// Returns the number of dropped iterations.
pub async fn run_constant_arrival_rate(name: &str, car: &ArrivalRate, ctx: &ExecutorContext) -> u64 {
    let semaphore = Arc::new(Semaphore::new(car.max_vus as usize));
    let mut ticker = tokio::time::interval(car.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let deadline = tokio::time::sleep(car.duration);
    tokio::pin!(deadline);

    let mut dropped = 0u64;
    let mut warned = false;

    loop {
        tokio::select! {
            biased;

            _ = ctx.run.cancelled() => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        dropped += 1;
                        if ctx.sample_tx.send(MetricEvent::Dropped).await.is_err() {
                            break;
                        }
                        continue;
                    },
                };

                if let Some(ref budget) = ctx.budget {
                    if !budget.try_acquire() {
                        break;
                    }
                }

                let in_use = car.max_vus as usize - semaphore.available_permits();
                if !warned && in_use > car.pre_allocated_vus as usize {
                    tracing::warn!(
                        scenario = name,
                        in_use,
                        pre_allocated_vus = car.pre_allocated_vus,
                        max_vus = car.max_vus,
                        "insufficient pre-allocated VUs, initializing more"
                    );
                    warned = true;
                }

                ctx.tracker.spawn(arrival_iteration(
                    ctx.runner.clone(),
                    ctx.sample_tx.clone(),
                    ctx.hard_stop.clone(),
                    ctx.active_vus.clone(),
                    permit,
                ));
            }
        }
    }

    if dropped > 0 {
        tracing::warn!(scenario = name, dropped, "iterations dropped: all max_vus were busy");
    }
    dropped
}

/// Ramping-VUs scheduler.
///
/// Every [`RAMP_TICK`] it computes the interpolated target, spawns VUs with
/// their own child token when below it, and cancels the most recently spawned
/// VUs (LIFO) when above it. A cancelled VU finishes its current iteration.
pub async fn run_ramping_vus(name: &str, ramp: &RampingVus, ctx: &ExecutorContext) {
    let total = ramp.total_duration();
    let stage_count = ramp.stages.len();
    let mut vu_tokens: Vec<CancellationToken> = Vec::new();
    let mut next_vu_id: u32 = 0;

    let mut ticker = tokio::time::interval(RAMP_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let start = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = ctx.run.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= total {
            break;
        }

        let stage = ramp.stage_index_at(elapsed) + 1;
        if let Ok(mut label) = ctx.stage_label.lock() {
            *label = Some(format!("{name} stage {stage}/{stage_count}"));
        }

        let target = ramp.vus_at(elapsed) as usize;
        while vu_tokens.len() < target {
            let token = ctx.run.child_token();
            vu_tokens.push(token.clone());
            ctx.tracker.spawn(vu_loop(
                next_vu_id,
                ctx.runner.clone(),
                ctx.sample_tx.clone(),
                token,
                ctx.hard_stop.clone(),
                ctx.budget.clone(),
                ctx.active_vus.clone(),
            ));
            next_vu_id += 1;
        }
        while vu_tokens.len() > target {
            if let Some(token) = vu_tokens.pop() {
                token.cancel();
            }
        }
    }

    for token in &vu_tokens {
        token.cancel();
    }
    tracing::debug!(scenario = name, spawned = next_vu_id, "ramp finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::client::PvzClient;
    use crate::loadtest::config::{Flow, Stage};

    fn context(sample_tx: mpsc::Sender<MetricEvent>) -> ExecutorContext {
        let client = PvzClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            Duration::from_millis(200),
        );
        ExecutorContext {
            runner: Arc::new(ScenarioRunner::new(client, Flow::DualRole, "Moscow", "box")),
            sample_tx,
            run: CancellationToken::new(),
            hard_stop: CancellationToken::new(),
            tracker: TaskTracker::new(),
            active_vus: ActiveVuCounter::new(),
            budget: None,
            stage_label: Arc::new(Mutex::new(None)),
        }
    }

    #[tokio::test]
    async fn test_arrival_rate_stops_at_duration() {
        let (tx, mut rx) = mpsc::channel(1024);
        let ctx = context(tx);
        let car = ArrivalRate {
            rate: 20,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_millis(300),
            pre_allocated_vus: 2,
            max_vus: 10,
        };

        let start = Instant::now();
        run_constant_arrival_rate("car", &car, &ctx).await;
        assert!(start.elapsed() < Duration::from_secs(2));

        ctx.tracker.close();
        ctx.tracker.wait().await;
        drop(ctx);

        let mut iterations = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, MetricEvent::Iteration { .. }) {
                iterations += 1;
            }
        }
        assert!(iterations >= 1, "at least one tick should start an iteration");
    }

    #[tokio::test]
    async fn test_arrival_rate_returns_on_run_cancel() {
        let (tx, _rx) = mpsc::channel(1024);
        let ctx = context(tx);
        ctx.run.cancel();
        let car = ArrivalRate {
            rate: 1,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(60),
            pre_allocated_vus: 1,
            max_vus: 1,
        };
        let dropped = run_constant_arrival_rate("car", &car, &ctx).await;
        assert_eq!(dropped, 0);
    }

    #[tokio::test]
    async fn test_ramping_vus_sets_stage_label_and_stops() {
        let (tx, _rx) = mpsc::channel(4096);
        let ctx = context(tx);
        let ramp = RampingVus {
            start_vus: 0,
            stages: vec![
                Stage {
                    duration: Duration::from_millis(200),
                    target: 2,
                },
                Stage {
                    duration: Duration::from_millis(200),
                    target: 0,
                },
            ],
        };

        run_ramping_vus("ramp", &ramp, &ctx).await;
        ctx.tracker.close();
        ctx.tracker.wait().await;

        let label = ctx.stage_label.lock().unwrap().clone();
        assert!(label.unwrap().starts_with("ramp stage "));
        assert_eq!(ctx.active_vus.get(), 0);
        assert!(ctx.active_vus.peak() <= 2);
    }
}

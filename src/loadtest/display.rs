//! k6-style live terminal display for load test progress.
//!
//! Renders a compact, in-place updating line showing active VU count,
//! iterations per second, P95 latency, error count/rate, check pass rate and
//! elapsed time. Updates every 2 seconds from a watch channel, not
//! per-request.

use crate::loadtest::engine::DisplayState;
use crate::loadtest::metrics::MetricsSnapshot;
use crate::loadtest::vu::ActiveVuCounter;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Live progress spinner on stderr.
pub struct LiveDisplay {
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped),
    /// color output is disabled.
    pub fn new(no_color: bool) -> Self {
        if no_color || !std::io::stderr().is_terminal() {
            colored::control::set_override(false);
        }

        let status_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}") {
            status_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self { status_bar }
    }

    /// Format a single line of live status from a snapshot.
    ///
    /// Color coding: red for errors and failing checks, yellow for
    /// P95 above one second, green otherwise.
    pub fn format_status(
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_vus: u32,
        max_vus: u32,
        stage_label: Option<&str>,
    ) -> String {
        let vu_display = format!("{active_vus}/{max_vus}").green();
        let iters_display = format!("{:.1}/s", snap.iterations_per_sec(elapsed)).green();

        let p95_str = format!("{}ms", snap.p95);
        let p95_display = if snap.p95 > 1000 {
            p95_str.yellow()
        } else {
            p95_str.green()
        };

        let error_rate_str = format!("{:.1}%", snap.error_rate * 100.0);
        let error_display = if snap.error_count > 0 {
            format!(
                "{} ({})",
                snap.error_count.to_string().red(),
                error_rate_str.red()
            )
        } else {
            format!("{} ({})", snap.error_count, error_rate_str)
        };

        let checks_display = match snap.checks_rate() {
            Some(rate) if rate < 1.0 => format!("{:.1}%", rate * 100.0).red().to_string(),
            Some(rate) => format!("{:.1}%", rate * 100.0).green().to_string(),
            None => "-".to_string(),
        };

        let metrics_line = format!(
            "vus: {}  |  iters: {}  |  p95: {}  |  errors: {}  |  checks: {}  |  elapsed: {}s",
            vu_display,
            iters_display,
            p95_display,
            error_display,
            checks_display,
            elapsed.as_secs()
        );

        match stage_label {
            Some(label) => format!("  [{label}]  {metrics_line}"),
            None => format!("  {metrics_line}"),
        }
    }

    /// Update the display with the latest snapshot.
    pub fn update(
        &self,
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_vus: u32,
        max_vus: u32,
        stage_label: Option<&str>,
    ) {
        let msg = Self::format_status(snap, elapsed, active_vus, max_vus, stage_label);
        self.status_bar.set_message(msg);
    }

    /// Stop the display and clear the spinner.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Run the live display loop.
///
/// Stops when `cancel` fires or the watch sender is dropped.
pub async fn display_loop(
    mut display_rx: watch::Receiver<DisplayState>,
    active_vus: ActiveVuCounter,
    max_vus: u32,
    cancel: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    loop {
        tokio::select! {
            result = display_rx.changed() => {
                if result.is_err() {
                    break;
                }
                let state = display_rx.borrow_and_update().clone();
                display.update(
                    &state.snapshot,
                    test_start.elapsed(),
                    active_vus.get(),
                    max_vus,
                    state.stage_label.as_deref(),
                );
            }
            _ = cancel.cancelled() => break,
        }
    }

    display.finish();
}

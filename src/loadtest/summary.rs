//! k6-style terminal summary renderer for load test results.
//!
//! [`render_summary`] is a pure function: it takes structured data and
//! returns a formatted [`String`]. Color coding goes through the `colored`
//! crate, which respects the global override set when `--no-color` is active
//! or output is piped.

use colored::Colorize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Render a k6-style terminal summary.
///
/// # Layout
///
/// ```text
///           /\      |  pvz-loadtest
///          /  \     |
///     /\  /    \    |  target:    http://localhost:8080
///    /  \/      \   |  scenarios: 1 (moderate_load)
///   /    \       \  |  max vus:   50
///  /      \       \ |  duration:  30s
///
///   ✓ dummyLogin 200
///   ✓ CreatePVZ 201
///   ✗ AddProduct 201
///     ↳  98% — ✓ 1470 / ✗ 30
///
///   checks......................: 99.33%  4470 / 4500
///   http_req_duration...........: p50=12ms  p95=48ms  p99=90ms
///   ...
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig) -> String {
    let snap = &result.snapshot;
    let mut lines = Vec::new();

    lines.push(render_header(config));

    if !snap.checks.is_empty() {
        for check in &snap.checks {
            if check.fails == 0 {
                lines.push(format!("  {} {}", "✓".green(), check.name));
            } else {
                lines.push(format!("  {} {}", "✗".red(), check.name));
                lines.push(format!(
                    "    ↳  {:.0}% — ✓ {} / ✗ {}",
                    check.rate() * 100.0,
                    check.passes,
                    check.fails
                ));
            }
        }
        lines.push(String::new());
    }

    if let Some(rate) = snap.checks_rate() {
        let passed = snap.checks_passed();
        let total = passed + snap.checks_failed();
        let value = format!("{:.2}%  {passed} / {total}", rate * 100.0);
        let colored = if rate < 1.0 {
            value.red().to_string()
        } else {
            value.green().to_string()
        };
        lines.push(format_metric_row("checks", &colored, PAD_WIDTH));
    }

    let latency_value = format!("p50={}ms  p95={}ms  p99={}ms", snap.p50, snap.p95, snap.p99);
    let latency_colored = if snap.p99 < 1000 {
        latency_value.green().to_string()
    } else {
        latency_value.yellow().to_string()
    };
    lines.push(format_metric_row(
        "http_req_duration",
        &latency_colored,
        PAD_WIDTH,
    ));

    let failed_pct = snap.error_rate * 100.0;
    let failed_str = format!("{failed_pct:.2}%  {} / {}", snap.error_count, snap.total_requests);
    let failed_colored = if failed_pct > 5.0 {
        failed_str.red().to_string()
    } else if failed_pct > 1.0 {
        failed_str.yellow().to_string()
    } else {
        failed_str.green().to_string()
    };
    lines.push(format_metric_row("http_req_failed", &failed_colored, PAD_WIDTH));

    lines.push(format_metric_row(
        "http_reqs",
        &format!(
            "{}  {:.1}/s",
            snap.total_requests,
            snap.requests_per_sec(result.elapsed)
        ),
        PAD_WIDTH,
    ));

    let it = &snap.iterations;
    lines.push(format_metric_row(
        "iteration_duration",
        &format!(
            "avg={:.0}ms  p50={}ms  p95={}ms  max={}ms",
            it.mean, it.p50, it.p95, it.max
        ),
        PAD_WIDTH,
    ));
    lines.push(format_metric_row(
        "iterations",
        &format!(
            "{}  {:.1}/s",
            it.completed,
            snap.iterations_per_sec(result.elapsed)
        ),
        PAD_WIDTH,
    ));
    if it.interrupted > 0 {
        lines.push(format_metric_row(
            "iterations_interrupted",
            &it.interrupted.to_string().yellow().to_string(),
            PAD_WIDTH,
        ));
    }
    if it.dropped > 0 {
        let planned = config.planned_iterations();
        let dropped = if planned > 0 {
            format!("{} of {planned} planned", it.dropped)
        } else {
            it.dropped.to_string()
        };
        lines.push(format_metric_row(
            "dropped_iterations",
            &dropped.red().to_string(),
            PAD_WIDTH,
        ));
    }
    lines.push(format_metric_row("vus_max", &result.peak_vus.to_string(), PAD_WIDTH));
    lines.push(format_metric_row(
        "elapsed",
        &format!("{:.1}s", result.elapsed.as_secs_f64()),
        PAD_WIDTH,
    ));

    if !snap.error_category_counts.is_empty() {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut categories: Vec<_> = snap.error_category_counts.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (category, count) in categories {
            lines.push(format_metric_row(
                &format!("    {category}"),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    if !snap.per_endpoint.is_empty() {
        let elapsed_secs = result.elapsed.as_secs_f64();
        lines.push(String::new());
        lines.push("  per-endpoint metrics:".to_string());
        lines.push(String::new());
        lines.push(format!(
            "  {:<40} {:>6} {:>9} {:>6} {:>7} {:>7} {:>7}",
            "endpoint", "reqs", "rate", "err%", "p50", "p95", "p99"
        ));
        lines.push(format!("  {}", "\u{2500}".repeat(86)));

        for ep in &snap.per_endpoint {
            let rate = if elapsed_secs > 0.0 {
                ep.total_requests as f64 / elapsed_secs
            } else {
                0.0
            };
            let err_pct = ep.error_rate * 100.0;
            let err_str = format!("{err_pct:.1}%");
            let err_colored = if err_pct > 5.0 {
                err_str.red().to_string()
            } else if err_pct > 1.0 {
                err_str.yellow().to_string()
            } else {
                err_str.green().to_string()
            };

            lines.push(format!(
                "  {:<40} {:>6} {:>9} {:>6} {:>7} {:>7} {:>7}",
                ep.endpoint.to_string(),
                ep.total_requests,
                format!("{rate:.1}/s"),
                err_colored,
                format!("{}ms", ep.p50),
                format!("{}ms", ep.p95),
                format!("{}ms", ep.p99),
            ));
        }
    }

    if !result.thresholds.is_empty() {
        lines.push(String::new());
        lines.push("  thresholds:".to_string());
        for t in &result.thresholds {
            let mark = if t.passed {
                "✓".green()
            } else {
                "✗".red()
            };
            lines.push(format!(
                "    {mark} {}: {} (actual {})",
                t.name, t.condition, t.actual
            ));
        }
    }

    lines.join("\n")
}

fn render_header(config: &LoadTestConfig) -> String {
    let names: Vec<&str> = config.scenario.iter().map(|s| s.name.as_str()).collect();
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  target:    {}
   /  \/      \   |  scenarios: {} ({})
  /    \       \  |  max vus:   {}
 /      \       \ |  duration:  {}
"#,
        "pvz-loadtest".bold(),
        config.settings.base_url,
        names.len(),
        names.join(", "),
        config.total_max_vus(),
        humantime::format_duration(config.effective_duration()),
    )
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}

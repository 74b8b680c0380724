//! Load testing engine for the PVZ pickup-point API.
//!
//! Provides typed TOML configuration and presets, a PVZ HTTP client,
//! per-flow scenario runners with named checks, constant-arrival-rate and
//! ramping-VU executors, HdrHistogram-based metrics, thresholds, and
//! terminal/JSON reporting.

pub mod checks;
pub mod client;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod presets;
pub mod report;
pub mod scenario;
pub mod summary;
pub mod thresholds;
pub mod vu;

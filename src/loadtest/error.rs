//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for configuration errors and [`RequestError`] for
//! transport and status failures encountered while driving the PVZ API.

/// Errors that occur during load test configuration parsing, validation, or file I/O.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero arrival rate, empty stage list).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// CLI-level error (unknown preset, scenario filter matched nothing).
    #[error("{message}")]
    Cli { message: String },

    /// A scenario executor task panicked or was cancelled; the results of
    /// the run are incomplete.
    #[error("Scenario executor failed: {source}")]
    Executor {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl LoadTestError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Failure of a single HTTP request against the target service.
///
/// Each variant is a distinct category the metrics pipeline counts and
/// reports separately. None of them abort an iteration.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RequestError {
    /// The service answered with a 4xx or 5xx status code.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request exceeded the configured per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The response body could not be read or was not valid JSON.
    #[error("Failed to decode response body: {message}")]
    Decode { message: String },
}

impl RequestError {
    /// Returns the error category as a static string for metrics classification.
    ///
    /// Categories: `"http"`, `"timeout"`, `"connection"`, `"decode"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Decode { .. } => "decode",
        }
    }

    /// Returns `true` for failures where no response was received at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection { .. })
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`RequestError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

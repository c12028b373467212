//! Error types for pool, fetch and run orchestration.
//!
//! Defines [`RunError`] for configuration and orchestration failures,
//! [`PoolError`] for task pool operations, and [`FetchError`] for failures of
//! a single fetch task. Fetch failures are carried as data in the run report
//! and never abort a run.

use serde::Serialize;

use crate::pool::TaskId;

/// Errors that abort a run before or while it executes.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The pool cannot hold every fetch task plus the producer.
    #[error("pool capacity {capacity} is too small: {required} slots are required (fetches + producer)")]
    CapacityMisconfiguration { capacity: usize, required: usize },

    /// TOML parse failure -- the config file is not valid TOML or does not
    /// match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed but holds invalid values.
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// The config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The producer left the pool before it became the last survivor.
    #[error("producer task {task_id} exited before the fetch tasks finished")]
    ProducerExited { task_id: TaskId },

    /// A pool operation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors returned by [`TaskPool`](crate::pool::TaskPool) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// No member with this id is present in the pool.
    #[error("task {task_id} is not a member of the pool")]
    NotFound { task_id: TaskId },

    /// Non-blocking submission found every slot taken.
    #[error("pool is at capacity ({capacity} tasks)")]
    CapacityExceeded { capacity: usize },

    /// The task was aborted before it produced a value.
    #[error("task {task_id} was cancelled")]
    Cancelled { task_id: TaskId },

    /// The task panicked.
    #[error("task {task_id} panicked: {message}")]
    Panicked { task_id: TaskId, message: String },

    /// The pool no longer admits tasks.
    #[error("pool is closed")]
    Closed,
}

/// Failure of a single fetch task.
///
/// Each variant is a distinct category the summary counts separately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The target answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body could not be read.
    #[error("Body error: {message}")]
    Body { message: String },

    /// The task running the fetch did not finish normally.
    #[error("Fetch task aborted: {message}")]
    Aborted { message: String },
}

impl FetchError {
    /// Returns the error category as a static string for the summary.
    ///
    /// Categories: `"timeout"`, `"connection"`, `"http"`, `"body"`, `"aborted"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Http { .. } => "http",
            Self::Body { .. } => "body",
            Self::Aborted { .. } => "aborted",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`FetchError`] variant.
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
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            Self::Body {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

impl From<PoolError> for FetchError {
    fn from(err: PoolError) -> Self {
        Self::Aborted {
            message: err.to_string(),
        }
    }
}

//! Run configuration loaded from TOML and overridden by CLI flags.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.
//!
//! # Example TOML
//!
//! ```toml
//! [pool]
//! fetches = 3
//! capacity = 4
//! poll_interval_ms = 50
//!
//! [fetch]
//! url = "https://www.python.org/"
//! delay_ms = 3000
//! timeout_ms = 30000
//!
//! [approximation]
//! algorithm = "fast-series"
//! precision = 200
//! yield_cadence = 1
//! ```

use std::num::NonZeroU64;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::approx::Algorithm;
use crate::error::RunError;
use crate::numeric::Precision;
use crate::orchestrator::Termination;
use crate::pool::MAX_CAPACITY;

/// Target fetched when none is configured.
pub const DEFAULT_URL: &str = "https://www.python.org/";

/// Largest accepted `precision`, in fractional digits.
pub const MAX_PRECISION: u32 = 100_000;

/// Top-level run configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pool sizing and termination detection.
    pub pool: PoolSettings,
    /// Fetch target and timing.
    pub fetch: FetchSettings,
    /// Producer algorithm.
    pub approximation: ApproxSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Number of fetch tasks.
    pub fetches: usize,
    /// Pool capacity; `fetches + 1` when absent.
    pub capacity: Option<usize>,
    /// Poll interval for the polling termination strategy. Absent selects
    /// event-driven termination.
    pub poll_interval_ms: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            fetches: 10,
            capacity: None,
            poll_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchSettings {
    pub url: String,
    /// Extra delay after each fetch, in milliseconds.
    pub delay_ms: u64,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            delay_ms: 3000,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApproxSettings {
    pub algorithm: Algorithm,
    /// Fractional digits; the algorithm's default when absent.
    pub precision: Option<u32>,
    /// Producer steps between yields to the scheduler.
    pub yield_cadence: u64,
}

impl Default for ApproxSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            precision: None,
            yield_cadence: 1,
        }
    }
}

impl RunConfig {
    /// Parse a TOML string into a validated [`RunConfig`].
    pub fn from_toml(content: &str) -> Result<Self, RunError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`RunConfig`] from a file path.
    ///
    /// Returns [`RunError::ConfigIo`] if the file cannot be read,
    /// [`RunError::ConfigParse`] if the TOML is malformed, or a validation
    /// error from [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, RunError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Check the configuration before any task is submitted.
    ///
    /// Checks:
    /// - capacity holds every fetch task plus the producer
    /// - capacity is at most [`MAX_CAPACITY`]
    /// - precision is at most [`MAX_PRECISION`]
    /// - yield cadence and request timeout are positive
    /// - a target is set when fetch tasks are requested
    pub fn validate(&self) -> Result<(), RunError> {
        let required = self.required_capacity();
        let capacity = self.effective_capacity();
        if capacity < required {
            return Err(RunError::CapacityMisconfiguration { capacity, required });
        }
        if capacity > MAX_CAPACITY {
            return Err(RunError::ConfigValidation {
                message: format!("capacity {capacity} exceeds the maximum of {MAX_CAPACITY}"),
            });
        }
        if let Some(precision) = self.approximation.precision {
            if precision > MAX_PRECISION {
                return Err(RunError::ConfigValidation {
                    message: format!(
                        "precision {precision} exceeds the maximum of {MAX_PRECISION} digits"
                    ),
                });
            }
        }
        if self.approximation.yield_cadence == 0 {
            return Err(RunError::ConfigValidation {
                message: "yield_cadence must be at least 1".to_string(),
            });
        }
        if self.fetch.timeout_ms == 0 {
            return Err(RunError::ConfigValidation {
                message: "timeout_ms must be at least 1".to_string(),
            });
        }
        if self.pool.fetches > 0 && self.fetch.url.trim().is_empty() {
            return Err(RunError::ConfigValidation {
                message: "fetch url must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Slots needed: one per fetch task plus the producer.
    pub fn required_capacity(&self) -> usize {
        self.pool.fetches.saturating_add(1)
    }

    /// Configured capacity, or exactly the required capacity.
    pub fn effective_capacity(&self) -> usize {
        self.pool
            .capacity
            .unwrap_or_else(|| self.required_capacity())
    }

    /// Configured precision, or the algorithm's default.
    pub fn precision(&self) -> Precision {
        self.approximation
            .precision
            .map(Precision::new)
            .unwrap_or_else(|| self.approximation.algorithm.default_precision())
    }

    /// Yield cadence; a zero value (rejected by validation) reads as 1.
    pub fn yield_cadence(&self) -> NonZeroU64 {
        NonZeroU64::new(self.approximation.yield_cadence).unwrap_or(NonZeroU64::MIN)
    }

    /// Delay applied after each fetch, if any.
    pub fn fetch_delay(&self) -> Option<Duration> {
        (self.fetch.delay_ms > 0).then(|| Duration::from_millis(self.fetch.delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.timeout_ms)
    }

    /// Termination strategy selected by `poll_interval_ms`.
    pub fn termination(&self) -> Termination {
        match self.pool.poll_interval_ms {
            Some(ms) => Termination::Poll {
                interval: Duration::from_millis(ms),
            },
            None => Termination::Event,
        }
    }
}

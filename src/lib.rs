//! Bounded task pool running finite fetches next to an unbounded producer.
//!
//! A run submits `N` [`FetchTask`]s and one producer task into a
//! capacity-bounded [`TaskPool`]. The producer steps a pi
//! [`ApproximationEngine`] forever, publishing every estimate into a
//! [`ResultCell`]. Once every fetch task has left the pool, the
//! [`Orchestrator`] cancels the producer, reads the latest estimate and
//! reports it together with each fetch's [`StatsRecord`] or failure.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fetchpi::{HttpFetcher, Orchestrator, RunConfig};
//!
//! # async fn demo() -> Result<(), fetchpi::RunError> {
//! let config = RunConfig::default();
//! let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30)));
//! let report = Orchestrator::new(config, fetcher)?.run().await?;
//! println!("pi ~= {} after {} steps", report.estimate.value, report.estimate.steps);
//! # Ok(())
//! # }
//! ```

pub mod approx;
pub mod cell;
pub mod config;
pub mod error;
pub mod fetch;
pub mod numeric;
pub mod orchestrator;
pub mod pool;
pub mod producer;
pub mod report;
pub mod summary;

pub use approx::{Algorithm, ApproximationEngine, ChudnovskySeries, Estimate, LeibnizSeries};
pub use cell::ResultCell;
pub use config::RunConfig;
pub use error::{FetchError, PoolError, RunError};
pub use fetch::{FetchTask, Fetcher, HttpFetcher, StatsRecord};
pub use numeric::{Decimal, Precision};
pub use orchestrator::{FetchOutcome, Orchestrator, RunPhase, RunReport, Termination};
pub use pool::{TaskHandle, TaskId, TaskPool, TaskStatus};

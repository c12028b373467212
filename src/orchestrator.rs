//! Run orchestration and last-survivor termination.
//!
//! [`Orchestrator::run`] walks the phases `Submitting -> Monitoring ->
//! Draining -> Done`:
//!
//! 1. **Submitting**: admits every [`FetchTask`] and then the producer into
//!    the [`TaskPool`].
//! 2. **Monitoring**: waits until the producer is the only pool member,
//!    either by reacting to occupancy changes ([`Termination::Event`]) or by
//!    checking on a fixed interval ([`Termination::Poll`]).
//! 3. **Draining**: waits for the producer's first estimate, cancels it,
//!    awaits its exit, reads the final estimate and collects every fetch
//!    outcome in submission order.
//! 4. **Done**: closes the pool and waits for it to drain.
//!
//! Fetch failures are recorded in the report; only configuration errors and
//! producer failures end a run with `Err`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use crate::approx::{Algorithm, Estimate};
use crate::cell::ResultCell;
use crate::config::RunConfig;
use crate::error::{FetchError, PoolError, RunError};
use crate::fetch::{FetchTask, Fetcher, StatsRecord};
use crate::numeric::Precision;
use crate::pool::{TaskHandle, TaskPool};
use crate::producer;

/// Label of the producer task in the pool.
pub const PRODUCER_LABEL: &str = "producer";

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Submitting,
    Monitoring,
    Draining,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Submitting => "submitting",
            Self::Monitoring => "monitoring",
            Self::Draining => "draining",
            Self::Done => "done",
        })
    }
}

/// How the monitoring phase detects the last-survivor condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// Re-check whenever pool occupancy changes.
    #[default]
    Event,
    /// Re-check every `interval`; a zero interval yields instead of sleeping.
    Poll { interval: Duration },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::Poll { interval } => write!(f, "poll every {}ms", interval.as_millis()),
        }
    }
}

/// Time at which a phase was entered, relative to the run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRecord {
    pub phase: RunPhase,
    pub entered_at: Duration,
}

/// What one fetch task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Submission index.
    pub task: usize,
    pub target: String,
    pub result: Result<StatsRecord, FetchError>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregated result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub algorithm: Algorithm,
    pub precision: Precision,
    pub capacity: usize,
    pub termination: Termination,
    /// Final producer estimate.
    pub estimate: Estimate,
    /// Fetch outcomes in submission order.
    pub fetches: Vec<FetchOutcome>,
    pub phases: Vec<PhaseRecord>,
    /// Wall time from start of submission to the end of `Done`.
    pub elapsed: Duration,
}

impl RunReport {
    /// Number of fetch tasks that returned a [`StatsRecord`].
    pub fn succeeded(&self) -> usize {
        self.fetches.iter().filter(|o| o.is_success()).count()
    }

    /// Number of fetch tasks that failed.
    pub fn failed(&self) -> usize {
        self.fetches.len() - self.succeeded()
    }
}

struct PhaseLog {
    started: Instant,
    records: Vec<PhaseRecord>,
}

impl PhaseLog {
    fn new(started: Instant) -> Self {
        Self {
            started,
            records: Vec::with_capacity(4),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        let entered_at = self.started.elapsed();
        tracing::info!(%phase, elapsed_ms = entered_at.as_millis() as u64, "entering phase");
        self.records.push(PhaseRecord { phase, entered_at });
    }
}

/// Owns the pool and result cell for exactly one run.
pub struct Orchestrator {
    config: RunConfig,
    fetcher: Arc<dyn Fetcher>,
    pool: TaskPool,
    cell: ResultCell<Estimate>,
    termination: Termination,
}

impl Orchestrator {
    /// Validates `config` and prepares an empty pool sized from it.
    ///
    /// Fails with [`RunError::CapacityMisconfiguration`] before anything is
    /// submitted if the pool could not hold every task.
    pub fn new(config: RunConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, RunError> {
        config.validate()?;
        let pool = TaskPool::new(config.effective_capacity());
        let termination = config.termination();
        Ok(Self {
            config,
            fetcher,
            pool,
            cell: ResultCell::new(),
            termination,
        })
    }

    /// Overrides the termination strategy derived from the config.
    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Executes the run to completion.
    pub async fn run(self) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let mut phases = PhaseLog::new(started);
        let precision = self.config.precision();
        let algorithm = self.config.approximation.algorithm;

        phases.enter(RunPhase::Submitting);
        let mut fetch_handles = Vec::with_capacity(self.config.pool.fetches);
        for id in 0..self.config.pool.fetches {
            let task = FetchTask::new(
                id,
                self.config.fetch.url.clone(),
                self.config.fetch_delay(),
                Arc::clone(&self.fetcher),
            );
            let target = task.target().to_string();
            let handle = self.pool.submit(format!("fetch-{id}"), task.run()).await?;
            fetch_handles.push((id, target, handle));
        }
        let producer = self
            .pool
            .submit(
                PRODUCER_LABEL,
                producer::drive(
                    algorithm.engine(precision),
                    self.cell.clone(),
                    self.config.yield_cadence(),
                ),
            )
            .await?;
        tracing::debug!(
            fetches = fetch_handles.len(),
            capacity = self.pool.capacity(),
            occupancy = self.pool.size(),
            "all tasks submitted"
        );

        phases.enter(RunPhase::Monitoring);
        self.await_last_survivor(&producer).await?;

        phases.enter(RunPhase::Draining);
        let first = tokio::select! {
            estimate = self.cell.read() => estimate,
            _ = self.await_exit(&producer) => {
                return Err(RunError::ProducerExited { task_id: producer.id() });
            }
        };
        tracing::debug!(steps = first.steps, "producer has published, cancelling");
        match self.pool.cancel(&producer) {
            Ok(()) | Err(PoolError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        match producer.join().await {
            Ok(()) | Err(PoolError::Cancelled { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        let estimate = self.cell.read().await;

        let fetches = join_all(fetch_handles.into_iter().map(
            |(task, target, handle)| async move {
                let result = handle.join().await.unwrap_or_else(|err| Err(err.into()));
                FetchOutcome {
                    task,
                    target,
                    result,
                }
            },
        ))
        .await;

        self.pool.close();
        self.pool.wait().await;
        phases.enter(RunPhase::Done);

        let report = RunReport {
            algorithm,
            precision,
            capacity: self.pool.capacity(),
            termination: self.termination,
            estimate,
            fetches,
            phases: phases.records,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            iteration = report.estimate.iteration,
            steps = report.estimate.steps,
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        Ok(report)
    }

    /// Returns `Ok(true)` once the producer is the sole member.
    fn is_last_survivor(&self, producer: &TaskHandle<()>) -> Result<bool, RunError> {
        if !self.pool.contains(producer) {
            return Err(RunError::ProducerExited {
                task_id: producer.id(),
            });
        }
        Ok(self.pool.size() == 1)
    }

    async fn await_last_survivor(&self, producer: &TaskHandle<()>) -> Result<(), RunError> {
        match self.termination {
            Termination::Event => {
                let mut occupancy = self.pool.occupancy();
                while !self.is_last_survivor(producer)? {
                    if occupancy.changed().await.is_err() {
                        return Err(PoolError::Closed.into());
                    }
                    tracing::debug!(occupancy = *occupancy.borrow(), "pool occupancy changed");
                }
            }
            Termination::Poll { interval } => {
                while !self.is_last_survivor(producer)? {
                    if interval.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }
        tracing::debug!(members = ?self.pool.members(), "producer is the last survivor");
        Ok(())
    }

    /// Resolves once the producer has left the pool.
    async fn await_exit(&self, producer: &TaskHandle<()>) {
        let mut occupancy = self.pool.occupancy();
        while self.pool.contains(producer) {
            if occupancy.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("termination", &self.termination)
            .finish()
    }
}

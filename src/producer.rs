//! The unbounded producer task.
//!
//! [`drive`] steps an [`ApproximationEngine`] forever, publishing each
//! estimate into a [`ResultCell`] and yielding to the scheduler every
//! `cadence` steps. It only stops when its task is aborted.

use std::num::NonZeroU64;

use crate::approx::{ApproximationEngine, Estimate};
use crate::cell::ResultCell;

/// Runs `engine` until the surrounding task is cancelled.
pub async fn drive(
    mut engine: Box<dyn ApproximationEngine>,
    cell: ResultCell<Estimate>,
    cadence: NonZeroU64,
) {
    tracing::debug!(
        algorithm = %engine.algorithm(),
        precision = engine.precision().digits(),
        cadence = cadence.get(),
        "producer started"
    );
    loop {
        let estimate = engine.step();
        tracing::trace!(
            iteration = estimate.iteration,
            steps = estimate.steps,
            value = %estimate.value,
            "approximation step"
        );
        let yield_now = estimate.steps % cadence.get() == 0;
        cell.write(estimate);
        if yield_now {
            tokio::task::yield_now().await;
        }
    }
}

//! Single-slot, overwrite-latest result cell.
//!
//! [`ResultCell`] wraps a [`tokio::sync::watch`] channel holding an
//! `Option<T>`. Writes replace the stored value and wake waiting readers.
//! Reads wait for the first write, then return whatever value is current;
//! intermediate values may be skipped.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared single-slot cell with blocking-until-first-write reads.
///
/// Cloning yields another handle to the same slot.
#[derive(Debug)]
pub struct ResultCell<T> {
    slot: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for ResultCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> ResultCell<T> {
    /// Creates an empty cell.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Stores `value`, replacing any previous one.
    pub fn write(&self, value: T) {
        self.slot.send_replace(Some(value));
    }

    /// Returns the latest value, waiting for the first write if needed.
    pub async fn read(&self) -> T {
        let mut rx = self.slot.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            // `self` owns the sender, so the channel stays open while we wait.
            let _ = rx.changed().await;
        }
    }

    /// Returns the latest value without waiting.
    pub fn try_read(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    /// Returns `true` once any value has been written.
    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl<T: Clone> Default for ResultCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Bounded-capacity task pool with membership tracking and forced removal.
//!
//! [`TaskPool`] admits futures up to a fixed capacity, spawns them on the
//! current tokio runtime via a [`TaskTracker`], and keeps a membership table
//! that the orchestrator queries to detect the last-survivor condition.
//!
//! # Design
//!
//! - **Admission**: one [`Semaphore`] permit per slot. [`TaskPool::submit`]
//!   waits for a free slot; [`TaskPool::try_submit`] fails fast with
//!   [`PoolError::CapacityExceeded`]. The permit travels with the task and
//!   is released only after the task has left the membership table.
//! - **Membership**: every spawned future owns a guard. When the future is
//!   dropped, because it finished or because it was aborted, the guard
//!   records the final [`TaskStatus`] and removes the entry. Occupancy
//!   changes are published on a `watch` channel.
//! - **Forced removal**: [`TaskPool::cancel`] aborts the task through its
//!   tokio `AbortHandle`. The task stops at its next suspension point.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::task::TaskTracker;

use crate::error::PoolError;

/// Identity of a task within one pool.
pub type TaskId = u64;

/// Lifecycle status of a pool task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted and spawned, not yet polled.
    Pending,
    /// Polled at least once and still a pool member.
    Running,
    /// Returned a value.
    Completed,
    /// Dropped before returning (aborted or panicked).
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for `Completed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        })
    }
}

struct Member {
    label: String,
    abort: Option<AbortHandle>,
}

/// Membership table shared between the pool and the guards of its tasks.
struct Members {
    table: Mutex<HashMap<TaskId, Member>>,
    occupancy: watch::Sender<usize>,
}

impl Members {
    fn insert(&self, id: TaskId, member: Member) {
        let mut table = self.table.lock();
        table.insert(id, member);
        self.occupancy.send_replace(table.len());
    }

    fn attach(&self, id: TaskId, abort: AbortHandle) {
        // The entry is already gone if the runtime dropped the future during spawn.
        if let Some(member) = self.table.lock().get_mut(&id) {
            member.abort = Some(abort);
        }
    }

    fn remove(&self, id: TaskId) {
        let mut table = self.table.lock();
        if table.remove(&id).is_some() {
            self.occupancy.send_replace(table.len());
        }
    }
}

/// Leaves the pool when the owning task's future is dropped.
struct Membership {
    id: TaskId,
    members: Arc<Members>,
    status: Arc<Mutex<TaskStatus>>,
    completed: bool,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Membership {
    fn drop(&mut self) {
        let status = if self.completed {
            TaskStatus::Completed
        } else {
            TaskStatus::Cancelled
        };
        *self.status.lock() = status;
        self.members.remove(self.id);
        tracing::debug!(task_id = self.id, %status, "task left pool");
    }
}

/// Handle to a task admitted into a [`TaskPool`].
///
/// The handle outlives pool membership: after the task finishes, its status
/// and return value stay reachable here.
pub struct TaskHandle<T> {
    id: TaskId,
    label: String,
    status: Arc<Mutex<TaskStatus>>,
    join: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    /// Returns the task's pool identity.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the label given at submission.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> TaskStatus {
        *self.status.lock()
    }

    /// Returns `true` once the task has stopped running.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the task and returns its value.
    ///
    /// Returns [`PoolError::Cancelled`] for an aborted task and
    /// [`PoolError::Panicked`] for one that panicked.
    pub async fn join(self) -> Result<T, PoolError> {
        let task_id = self.id;
        self.join.await.map_err(|err| join_error(task_id, err))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("status", &self.status())
            .finish()
    }
}

fn join_error(task_id: TaskId, err: JoinError) -> PoolError {
    if err.is_cancelled() {
        return PoolError::Cancelled { task_id };
    }
    let message = match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    };
    PoolError::Panicked { task_id, message }
}

/// Capacity-bounded pool of concurrently running tasks.
pub struct TaskPool {
    capacity: usize,
    slots: Arc<Semaphore>,
    members: Arc<Members>,
    tracker: TaskTracker,
    next_id: AtomicU64,
}

/// Largest capacity a pool accepts.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

impl TaskPool {
    /// Creates an empty pool that runs at most `capacity` tasks at once.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let (occupancy, _) = watch::channel(0);
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            members: Arc::new(Members {
                table: Mutex::new(HashMap::new()),
                occupancy,
            }),
            tracker: TaskTracker::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Returns the maximum number of concurrently running tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tasks still occupying the pool.
    pub fn size(&self) -> usize {
        self.members.table.lock().len()
    }

    /// Returns `true` if no task occupies the pool.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the number of free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Returns `true` if the handle's task is still a pool member.
    pub fn contains<T>(&self, handle: &TaskHandle<T>) -> bool {
        self.contains_id(handle.id())
    }

    /// Returns `true` if a task with this id is still a pool member.
    pub fn contains_id(&self, id: TaskId) -> bool {
        self.members.table.lock().contains_key(&id)
    }

    /// Returns `(id, label)` of every member, ordered by id.
    pub fn members(&self) -> Vec<(TaskId, String)> {
        let mut members: Vec<_> = self
            .members
            .table
            .lock()
            .iter()
            .map(|(id, member)| (*id, member.label.clone()))
            .collect();
        members.sort_unstable_by_key(|(id, _)| *id);
        members
    }

    /// Subscribes to occupancy changes. The current value is the pool size.
    pub fn occupancy(&self) -> watch::Receiver<usize> {
        self.members.occupancy.subscribe()
    }

    /// Admits `task`, waiting for a free slot if the pool is full.
    ///
    /// Returns [`PoolError::Closed`] once [`close`](Self::close) was called.
    pub async fn submit<F>(
        &self,
        label: impl Into<String>,
        task: F,
    ) -> Result<TaskHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(self.spawn_admitted(label.into(), task, permit))
    }

    /// Admits `task` only if a slot is free right now.
    pub fn try_submit<F>(
        &self,
        label: impl Into<String>,
        task: F,
    ) -> Result<TaskHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|err| match err {
                TryAcquireError::NoPermits => PoolError::CapacityExceeded {
                    capacity: self.capacity,
                },
                TryAcquireError::Closed => PoolError::Closed,
            })?;
        Ok(self.spawn_admitted(label.into(), task, permit))
    }

    /// Forcibly stops a member task.
    ///
    /// The task is dropped at its next suspension point; its handle then
    /// reports [`TaskStatus::Cancelled`] and `join` yields
    /// [`PoolError::Cancelled`]. Returns [`PoolError::NotFound`] if the task
    /// already left the pool.
    pub fn cancel<T>(&self, handle: &TaskHandle<T>) -> Result<(), PoolError> {
        self.cancel_id(handle.id())
    }

    /// Forcibly stops the member task with this id.
    pub fn cancel_id(&self, id: TaskId) -> Result<(), PoolError> {
        let (label, abort) = {
            let table = self.members.table.lock();
            let member = table.get(&id).ok_or(PoolError::NotFound { task_id: id })?;
            (member.label.clone(), member.abort.clone())
        };
        tracing::debug!(task_id = id, %label, "cancelling task");
        if let Some(abort) = abort {
            abort.abort();
        }
        Ok(())
    }

    /// Stops admitting new tasks. Running members are unaffected.
    pub fn close(&self) {
        self.slots.close();
        self.tracker.close();
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Waits until the pool is closed and every spawned task has been reaped.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    fn spawn_admitted<F>(
        &self,
        label: String,
        task: F,
        permit: OwnedSemaphorePermit,
    ) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let status = Arc::new(Mutex::new(TaskStatus::Pending));
        let mut membership = Membership {
            id,
            members: Arc::clone(&self.members),
            status: Arc::clone(&status),
            completed: false,
            _permit: permit,
        };

        // Insert before spawning so size() counts the task from submission on.
        self.members.insert(
            id,
            Member {
                label: label.clone(),
                abort: None,
            },
        );
        let join = self.tracker.spawn(async move {
            *membership.status.lock() = TaskStatus::Running;
            let output = task.await;
            membership.completed = true;
            output
        });
        self.members.attach(id, join.abort_handle());
        tracing::debug!(task_id = id, %label, "task admitted");

        TaskHandle {
            id,
            label,
            status,
            join,
        }
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_size_tracks_membership() {
        let pool = TaskPool::new(4);
        let (tx, rx) = oneshot::channel::<()>();
        let waiting = pool
            .submit("waiting", async move {
                let _ = rx.await;
                "done"
            })
            .await
            .unwrap();
        let quick = pool.submit("quick", async { 7 }).await.unwrap();
        assert_eq!(pool.size(), 2);
        assert!(pool.contains(&waiting));
        assert!(pool.contains(&quick));

        assert_eq!(quick.join().await.unwrap(), 7);
        assert_eq!(pool.size(), 1);

        tx.send(()).unwrap();
        assert!(pool.contains(&waiting));
        assert_eq!(waiting.join().await.unwrap(), "done");
        assert!(pool.is_empty());
        assert_eq!(pool.available(), 4);
    }

    #[tokio::test]
    async fn test_status_progression() {
        let pool = TaskPool::new(1);
        let handle = pool.submit("job", async { 1 }).await.unwrap();
        assert_eq!(handle.status(), TaskStatus::Pending);
        tokio::task::yield_now().await;
        assert_eq!(handle.status(), TaskStatus::Completed);
        assert!(handle.status().is_terminal());
        assert_eq!(handle.join().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_try_submit_rejects_when_full() {
        let pool = TaskPool::new(1);
        let (tx, rx) = oneshot::channel::<()>();
        let first = pool
            .try_submit("first", async move {
                let _ = rx.await;
            })
            .unwrap();

        let err = pool.try_submit("second", async {}).unwrap_err();
        assert_eq!(err, PoolError::CapacityExceeded { capacity: 1 });

        tx.send(()).unwrap();
        first.join().await.unwrap();
        assert!(pool.try_submit("third", async {}).is_ok());
    }

    #[tokio::test]
    async fn test_submit_waits_for_free_slot() {
        let pool = Arc::new(TaskPool::new(1));
        let (tx, rx) = oneshot::channel::<()>();
        let first = pool
            .submit("first", async move {
                let _ = rx.await;
            })
            .await
            .unwrap();

        let submitter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.submit("second", async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!submitter.is_finished(), "submission must wait for a slot");
        assert_eq!(pool.size(), 1);

        tx.send(()).unwrap();
        first.join().await.unwrap();
        let second = submitter.await.unwrap().unwrap();
        assert_eq!(second.join().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_running_task() {
        let pool = TaskPool::new(2);
        let handle = pool
            .submit("forever", async {
                loop {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(handle.status(), TaskStatus::Running);

        pool.cancel(&handle).unwrap();
        let id = handle.id();
        let err = handle.join().await.unwrap_err();
        assert_eq!(err, PoolError::Cancelled { task_id: id });
        assert!(!pool.contains_id(id));
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_first_poll_marks_cancelled() {
        let pool = TaskPool::new(1);
        let handle = pool.submit("never-polled", async { 1 }).await.unwrap();
        pool.cancel(&handle).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert!(matches!(
            handle.join().await,
            Err(PoolError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_not_found() {
        let pool = TaskPool::new(1);
        assert_eq!(
            pool.cancel_id(99),
            Err(PoolError::NotFound { task_id: 99 })
        );

        let handle = pool.submit("done", async {}).await.unwrap();
        let id = handle.id();
        handle.join().await.unwrap();
        assert_eq!(pool.cancel_id(id), Err(PoolError::NotFound { task_id: id }));
    }

    #[tokio::test]
    async fn test_panicking_task_leaves_pool() {
        let pool = TaskPool::new(1);
        let handle = pool
            .submit("boom", async {
                panic!("exploded");
            })
            .await
            .unwrap();
        match handle.join().await {
            Err(PoolError::Panicked { message, .. }) => assert_eq!(message, "exploded"),
            other => panic!("expected panic error, got {other:?}"),
        }
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_occupancy_channel_follows_size() {
        let pool = TaskPool::new(3);
        let mut occupancy = pool.occupancy();
        assert_eq!(*occupancy.borrow_and_update(), 0);

        let (tx, rx) = oneshot::channel::<()>();
        let handle = pool
            .submit("held", async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
        assert!(occupancy.has_changed().unwrap());
        assert_eq!(*occupancy.borrow_and_update(), 1);

        tx.send(()).unwrap();
        occupancy.wait_for(|&n| n == 0).await.unwrap();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_members_listed_in_submission_order() {
        let pool = TaskPool::new(3);
        let (tx, rx) = oneshot::channel::<()>();
        let rx = futures::future::FutureExt::shared(rx);
        for label in ["a", "b", "c"] {
            let rx = rx.clone();
            pool.submit(label, async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
        }
        let labels: Vec<_> = pool.members().into_iter().map(|(_, l)| l).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        tx.send(()).unwrap();
        pool.close();
        pool.wait().await;
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_submissions() {
        let pool = TaskPool::new(2);
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(
            pool.submit("late", async {}).await.unwrap_err(),
            PoolError::Closed
        );
        assert_eq!(
            pool.try_submit("late", async {}).unwrap_err(),
            PoolError::Closed
        );
        pool.wait().await;
    }
}

//! Worker pool for job attempts
//!
//! Runs attempts on a bounded number of execution slots and delivers their
//! results through a single-consumer completion channel.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::load::{LoadSnapshot, PoolLoad};
use crate::config::duration_millis;
use crate::job::{AttemptError, JobResult, JobRunner, JobSpec};

/// Opaque handle of one in-flight attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingHandle(Uuid);

impl PendingHandle {
    /// Create a new, time-ordered handle
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PendingHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PendingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Maximum attempts executing at once
    pub max_concurrency: usize,

    /// Attempts that may wait for a slot before `submit` starts waiting
    pub queue_capacity: usize,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            queue_capacity: 64,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set the admission queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Attempts admitted at once (running plus queued)
    pub fn admission_capacity(&self) -> usize {
        self.max_concurrency.max(1) + self.queue_capacity
    }
}

/// What shutdown does with attempts still in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Let in-flight attempts finish
    Drain,

    /// Ask in-flight attempts to stop at the next unit boundary
    Cancel,
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Accepting attempts
    Running,
    /// Waiting for in-flight attempts, not accepting new ones
    Draining,
    /// Pool has stopped
    Stopped,
}

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerPoolError {
    /// Admission queue is full; retry later
    #[error("worker pool saturated ({capacity} attempts admitted)")]
    Saturated { capacity: usize },

    /// Pool is shutting down or stopped
    #[error("worker pool is not running")]
    NotRunning,

    /// Shutdown timeout
    #[error("graceful shutdown timed out with {remaining} attempts still running")]
    ShutdownTimeout { remaining: usize },
}

/// Result of one attempt, tagged with its handle
#[derive(Debug, Clone)]
pub struct Completion {
    pub handle: PendingHandle,
    pub result: Result<JobResult, AttemptError>,
}

/// Bounded pool executing job attempts
///
/// Every submitted spec runs exactly once on one worker task; the pool never
/// retries. Dropping the pool cancels and aborts whatever is still running.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    runner: JobRunner,
    admission: Arc<Semaphore>,
    slots: Arc<Semaphore>,
    load: Arc<PoolLoad>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    outstanding: HashSet<PendingHandle>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    status: WorkerPoolStatus,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(config: WorkerPoolConfig, runner: JobRunner) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        info!(
            max_concurrency,
            queue_capacity = config.queue_capacity,
            "Starting worker pool"
        );

        Self {
            admission: Arc::new(Semaphore::new(config.admission_capacity())),
            slots: Arc::new(Semaphore::new(max_concurrency)),
            load: Arc::new(PoolLoad::new(max_concurrency)),
            config,
            runner,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            outstanding: HashSet::new(),
            completions_tx,
            completions_rx,
            status: WorkerPoolStatus::Running,
        }
    }

    /// Submit an attempt, waiting for admission if the queue is full
    #[instrument(skip(self, spec), fields(job_id = %spec.job_id, attempt = spec.attempt))]
    pub async fn submit(&mut self, spec: JobSpec) -> Result<PendingHandle, WorkerPoolError> {
        self.submit_after(spec, Duration::ZERO).await
    }

    /// Submit an attempt that waits `delay` before taking a slot
    ///
    /// The delay runs on the worker task, so the caller only waits for
    /// admission.
    pub async fn submit_after(
        &mut self,
        spec: JobSpec,
        delay: Duration,
    ) -> Result<PendingHandle, WorkerPoolError> {
        self.ensure_running()?;
        let admission = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| WorkerPoolError::NotRunning)?;
        Ok(self.dispatch(spec, admission, delay))
    }

    /// Submit an attempt without waiting
    ///
    /// # Errors
    ///
    /// Returns [`WorkerPoolError::Saturated`] when the admission queue is full.
    pub fn try_submit(&mut self, spec: JobSpec) -> Result<PendingHandle, WorkerPoolError> {
        self.ensure_running()?;
        let admission = match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                return Err(WorkerPoolError::Saturated {
                    capacity: self.config.admission_capacity(),
                })
            }
            Err(TryAcquireError::Closed) => return Err(WorkerPoolError::NotRunning),
        };
        Ok(self.dispatch(spec, admission, Duration::ZERO))
    }

    /// Wait for any outstanding attempt to finish
    ///
    /// Completions arrive in the order attempts finish. Returns `None` when
    /// nothing is outstanding.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if self.outstanding.is_empty() {
            return None;
        }

        let completion = self.completions_rx.recv().await?;
        self.outstanding.remove(&completion.handle);
        Some(completion)
    }

    /// Ask every attempt to stop at its next unit boundary
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Shutdown the pool
    ///
    /// Stops admission, then waits up to `shutdown_timeout` for attempts to
    /// finish. Attempts still running after the timeout are aborted.
    /// Completions produced while draining stay readable through
    /// [`WorkerPool::next_completion`].
    pub async fn shutdown(&mut self, mode: ShutdownMode) -> Result<(), WorkerPoolError> {
        self.shutdown_within(mode, self.config.shutdown_timeout).await
    }

    /// Shutdown the pool, waiting at most `timeout` instead of the configured
    /// `shutdown_timeout`
    ///
    /// A zero timeout aborts whatever has not already finished.
    #[instrument(skip(self))]
    pub async fn shutdown_within(
        &mut self,
        mode: ShutdownMode,
        timeout: Duration,
    ) -> Result<(), WorkerPoolError> {
        if self.status == WorkerPoolStatus::Stopped {
            return Ok(());
        }

        info!(
            ?mode,
            timeout_ms = timeout.as_millis() as u64,
            outstanding = self.outstanding.len(),
            "Initiating worker pool shutdown"
        );

        self.status = WorkerPoolStatus::Draining;
        self.admission.close();
        if mode == ShutdownMode::Cancel {
            self.cancel.cancel();
        }

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        self.status = WorkerPoolStatus::Stopped;

        match drained {
            Ok(()) => {
                info!("Worker pool stopped");
                Ok(())
            }
            Err(_) => {
                let remaining = self.tasks.len();
                warn!(remaining, "Shutdown timeout reached, aborting attempts");
                self.tasks.abort_all();
                Err(WorkerPoolError::ShutdownTimeout { remaining })
            }
        }
    }

    pub fn status(&self) -> WorkerPoolStatus {
        self.status
    }

    /// Current queued/running counts
    pub fn load(&self) -> LoadSnapshot {
        self.load.snapshot()
    }

    /// Attempts submitted whose completion has not been taken yet
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, handle: &PendingHandle) -> bool {
        self.outstanding.contains(handle)
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    fn ensure_running(&self) -> Result<(), WorkerPoolError> {
        if self.status == WorkerPoolStatus::Running {
            Ok(())
        } else {
            Err(WorkerPoolError::NotRunning)
        }
    }

    fn dispatch(
        &mut self,
        spec: JobSpec,
        admission: OwnedSemaphorePermit,
        delay: Duration,
    ) -> PendingHandle {
        // Reap finished tasks so the join set does not grow with every attempt.
        while self.tasks.try_join_next().is_some() {}

        let handle = PendingHandle::new();
        let runner = self.runner.clone();
        let slots = Arc::clone(&self.slots);
        let load = Arc::clone(&self.load);
        let cancel = self.cancel.clone();
        let completions = self.completions_tx.clone();

        debug!(
            %handle,
            job_id = %spec.job_id,
            remaining = spec.remaining_units,
            delay_ms = delay.as_millis() as u64,
            "Attempt admitted"
        );

        load.task_queued();
        self.outstanding.insert(handle);

        self.tasks.spawn(async move {
            let _admission = admission;

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }

            let result = match slots.acquire_owned().await {
                Ok(_slot) => {
                    load.task_started();
                    let result = execute(&runner, spec, handle, cancel).await;
                    load.task_finished();
                    result
                }
                Err(_) => {
                    load.task_dropped();
                    Err(AttemptError::Cancelled {
                        completed_units: 0,
                        remaining_units: spec.remaining_units,
                        job_id: spec.job_id,
                    })
                }
            };

            // The receiver only goes away with the pool itself.
            let _ = completions.send(Completion { handle, result });
        });

        handle
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // The join set aborts its tasks on drop; cancel first so attempts
        // blocked in a unit observe it.
        self.cancel.cancel();
    }
}

async fn execute(
    runner: &JobRunner,
    spec: JobSpec,
    handle: PendingHandle,
    cancel: CancellationToken,
) -> Result<JobResult, AttemptError> {
    let job_id = spec.job_id.clone();
    let assigned = spec.remaining_units;

    match AssertUnwindSafe(runner.run(spec, handle, cancel))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&*panic);
            warn!(%handle, %job_id, %message, "Attempt panicked");
            Err(AttemptError::Fault {
                job_id,
                completed_units: 0,
                remaining_units: assigned,
                message: format!("attempt panicked: {message}"),
            })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

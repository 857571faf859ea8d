//! Worker pool for job attempts
//!
//! This module provides:
//! - [`WorkerPool`] - bounded concurrent execution of job attempts
//! - [`PoolLoad`] - queued/running counters used for admission and status
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │                                                              │
//! │  submit() ──► Admission (Semaphore: N + queue_capacity)      │
//! │                    │                                         │
//! │                    ▼                                         │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │         Execution slots (Semaphore: N)               │    │
//! │  │  [Attempt 1] [Attempt 2] ... [Attempt N]             │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                    │                                         │
//! │                    ▼                                         │
//! │  completions (mpsc, single consumer) ──► next_completion()  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use revive_engine::worker::{WorkerPool, WorkerPoolConfig, ShutdownMode};
//!
//! let config = WorkerPoolConfig::new().with_max_concurrency(5);
//! let mut pool = WorkerPool::new(config, runner);
//!
//! let handle = pool.submit(JobSpec::new("job-1", 30)).await?;
//! let completion = pool.next_completion().await.expect("one attempt in flight");
//! assert_eq!(completion.handle, handle);
//!
//! pool.shutdown(ShutdownMode::Drain).await?;
//! ```

mod load;
mod pool;

pub use load::{LoadSnapshot, PoolLoad};
pub use pool::{
    Completion, PendingHandle, ShutdownMode, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerPoolStatus,
};

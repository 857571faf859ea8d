//! # Revival Engine
//!
//! An in-memory runner that keeps jobs alive across failures. Each job is a
//! count of fallible work units; when a unit fails the attempt ends and the
//! job is revived with the work it has left.
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most N attempts run at once, with admission backpressure
//! - **Remaining-work revival**: a failed attempt reports its remaining units and the next attempt starts from there
//! - **Single ownership**: a job never has two attempts in flight
//! - **Revival policy**: attempt ceiling with optional backoff and jitter
//! - **Fault isolation**: a faulted or panicking attempt ends only its own job
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RevivalScheduler                         │
//! │  (tracks in-flight attempts, revives failed jobs)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  (N execution slots, completion channel)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  JobRunner  ──►  WorkUnit                    │
//! │  (one attempt: units until done or the first failure)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use revive_engine::prelude::*;
//!
//! struct Divide;
//!
//! #[async_trait]
//! impl WorkUnit for Divide {
//!     async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault> {
//!         if ctx.unit_index == 7 && ctx.attempt == 1 {
//!             return Ok(UnitOutcome::failure("division by zero"));
//!         }
//!         Ok(UnitOutcome::success(1.0))
//!     }
//! }
//!
//! let scheduler = RevivalScheduler::new(
//!     WorkerPoolConfig::new().with_max_concurrency(5),
//!     JobRunner::new(Arc::new(Divide), Arc::new(TracingSink)),
//!     RevivalPolicy::default(),
//! );
//! let report = scheduler
//!     .run_to_completion(vec![JobSpec::new("a", 30), JobSpec::new("b", 30)])
//!     .await?;
//! assert!(report.all_completed());
//! ```

pub mod config;
pub mod engine;
pub mod job;
pub mod reliability;
pub mod unit;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;

    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::engine::{JobOutcome, JobStatus, RevivalScheduler, RunReport, SchedulerError};
    pub use crate::job::{
        EventSink, JobEvent, JobId, JobResult, JobRunner, JobSpec, MemorySink, TracingSink,
    };
    pub use crate::reliability::RevivalPolicy;
    pub use crate::unit::{FnWork, SimulatedWork, UnitContext, UnitFault, UnitOutcome, WorkUnit};
    pub use crate::worker::{ShutdownMode, WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use config::{ConfigError, EngineConfig};
pub use engine::{
    JobOutcome, JobRegistry, JobStatus, RegistryError, RevivalScheduler, RunReport, SchedulerError,
};
pub use job::{
    AttemptError, AttemptOutcome, EventSink, JobEvent, JobId, JobResult, JobRunner, JobSpec,
    MemorySink, NullSink, SinkError, TracingSink,
};
pub use reliability::RevivalPolicy;
pub use unit::{FnWork, SimulatedWork, UnitContext, UnitFault, UnitOutcome, WorkUnit};
pub use worker::{
    Completion, PendingHandle, ShutdownMode, WorkerPool, WorkerPoolConfig, WorkerPoolError,
};

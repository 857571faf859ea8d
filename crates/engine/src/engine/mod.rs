//! Revival engine
//!
//! The [`RevivalScheduler`] submits jobs to the worker pool, watches their
//! completions, and revives failed jobs with their remaining work until each
//! one completes, faults, or exhausts its revival policy.
//!
//! ```text
//!   JobSpec ──► WorkerPool ──► JobRunner ──► JobResult
//!      ▲                                        │
//!      │          Failed (remaining > 0)        │
//!      └──────────── RevivalScheduler ◄─────────┘
//!                          │
//!                          ▼ Completed / Abandoned / Faulted
//!                      RunReport
//! ```

mod registry;
mod report;
mod scheduler;

pub use registry::{JobRegistry, RegistryError};
pub use report::{JobOutcome, JobStatus, RunReport};
pub use scheduler::{RevivalScheduler, SchedulerError};

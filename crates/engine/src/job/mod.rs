//! Jobs, their attempts, and the events they emit
//!
//! This module provides:
//! - [`JobSpec`] / [`JobResult`] - what an attempt is asked to do and what it did
//! - [`JobRunner`] - runs one attempt as a loop of work units
//! - [`JobEvent`] / [`EventSink`] - progress reporting

mod event;
mod runner;
mod types;

pub use event::{EventSink, JobEvent, MemorySink, NullSink, SinkError, TracingSink};
pub use runner::{AttemptError, JobRunner};
pub use types::{AttemptOutcome, JobId, JobResult, JobSpec};

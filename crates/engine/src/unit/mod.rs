//! Work unit abstractions
//!
//! A work unit is the smallest piece of work a job performs. Units:
//! - Either succeed with a value or fail with a reason
//! - Never retry internally (revival happens at the job level)
//! - Can observe cancellation through their context

mod context;
mod definition;
mod simulated;

pub use context::UnitContext;
pub use definition::{FnWork, UnitFault, UnitOutcome, WorkUnit};
pub use simulated::SimulatedWork;

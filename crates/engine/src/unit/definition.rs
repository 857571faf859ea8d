//! Work unit trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::UnitContext;

/// Outcome of one work unit attempt
///
/// A `Failure` is an expected result, not an error: the job stops and
/// reports its remaining work so the scheduler can revive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// The unit finished and produced a value
    Success { value: f64 },

    /// The unit failed; no value was produced
    Failure { reason: String },
}

impl UnitOutcome {
    /// Create a successful outcome
    pub fn success(value: f64) -> Self {
        Self::Success { value }
    }

    /// Create a failed outcome
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    /// Whether the unit succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Unexpected fault raised by a work unit
///
/// Faults are outside the failure protocol. They end the current attempt
/// and are never retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct UnitFault {
    /// Fault message
    pub message: String,

    /// Additional fault details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl UnitFault {
    /// Create a new fault
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Add fault details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A single opaque operation that may fail
///
/// # Example
///
/// ```ignore
/// use revive_engine::prelude::*;
///
/// struct FetchPage;
///
/// #[async_trait]
/// impl WorkUnit for FetchPage {
///     async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault> {
///         match fetch(ctx.unit_index).await {
///             Ok(bytes) => Ok(UnitOutcome::success(bytes as f64)),
///             Err(e) if e.is_transient() => Ok(UnitOutcome::failure(e.to_string())),
///             Err(e) => Err(UnitFault::new(e.to_string())),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    /// Attempt the unit once
    ///
    /// # Errors
    ///
    /// Return `UnitOutcome::Failure` for failures the job should recover from
    /// by revival. Return `UnitFault` only for unexpected faults.
    async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault>;
}

/// Adapter turning a synchronous closure into a [`WorkUnit`]
///
/// Handy for scripting failure patterns:
///
/// ```
/// use revive_engine::unit::{FnWork, UnitOutcome};
///
/// let work = FnWork::new(|ctx| {
///     if ctx.unit_index == 2 {
///         Ok(UnitOutcome::failure("third unit fails"))
///     } else {
///         Ok(UnitOutcome::success(1.0))
///     }
/// });
/// # let _ = work;
/// ```
pub struct FnWork<F> {
    f: F,
}

impl<F> FnWork<F>
where
    F: Fn(&UnitContext) -> Result<UnitOutcome, UnitFault> + Send + Sync + 'static,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> WorkUnit for FnWork<F>
where
    F: Fn(&UnitContext) -> Result<UnitOutcome, UnitFault> + Send + Sync + 'static,
{
    async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault> {
        (self.f)(ctx)
    }
}

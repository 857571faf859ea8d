//! Work unit execution context

use tokio_util::sync::CancellationToken;

use crate::job::JobId;
use crate::worker::PendingHandle;

/// Context handed to a work unit on every attempt
///
/// The context provides:
/// - The job and attempt the unit belongs to
/// - The unit's position within the current attempt
/// - Cancellation detection
#[derive(Debug, Clone)]
pub struct UnitContext {
    /// Job this unit belongs to
    pub job_id: JobId,

    /// Attempt number of the job (1-based)
    pub attempt: u32,

    /// Handle of the in-flight attempt
    pub handle: PendingHandle,

    /// Index of this unit within the current attempt (0-based)
    pub unit_index: u32,

    cancellation: CancellationToken,
}

impl UnitContext {
    /// Create a new context with a fresh cancellation token
    pub fn new(job_id: JobId, attempt: u32, handle: PendingHandle) -> Self {
        Self {
            job_id,
            attempt,
            handle,
            unit_index: 0,
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach the cancellation token of the owning pool
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when cancellation is requested
    ///
    /// Useful in `select!` around long-running units:
    ///
    /// ```ignore
    /// tokio::select! {
    ///     value = compute() => Ok(UnitOutcome::success(value)),
    ///     _ = ctx.cancelled() => Ok(UnitOutcome::failure("cancelled")),
    /// }
    /// ```
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

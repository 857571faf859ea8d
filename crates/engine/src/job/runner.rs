//! Runs one attempt of a job as a loop of work units

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{EventSink, JobEvent, JobId, JobResult, JobSpec, SinkError};
use crate::unit::{UnitContext, UnitFault, UnitOutcome, WorkUnit};
use crate::worker::PendingHandle;

/// Reasons an attempt ended without a [`JobResult`]
///
/// Simulated failures are not errors; they come back as a failed
/// `JobResult`. These variants cover what revival must not retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    /// A collaborator raised an unexpected fault
    #[error("job {job_id} faulted after {completed_units} units: {message}")]
    Fault {
        job_id: JobId,
        completed_units: u32,
        remaining_units: u32,
        message: String,
    },

    /// Cancellation was requested before the attempt finished
    #[error("job {job_id} cancelled with {remaining_units} units left")]
    Cancelled {
        job_id: JobId,
        completed_units: u32,
        remaining_units: u32,
    },
}

impl AttemptError {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Fault { job_id, .. } | Self::Cancelled { job_id, .. } => job_id,
        }
    }

    /// Units finished before the attempt ended
    pub fn completed_units(&self) -> u32 {
        match self {
            Self::Fault {
                completed_units, ..
            }
            | Self::Cancelled {
                completed_units, ..
            } => *completed_units,
        }
    }

    /// Units never finished by the attempt
    pub fn remaining_units(&self) -> u32 {
        match self {
            Self::Fault {
                remaining_units, ..
            }
            | Self::Cancelled {
                remaining_units, ..
            } => *remaining_units,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}

/// Executes job attempts
///
/// Cheap to clone; the pool hands a clone to every worker task.
#[derive(Clone)]
pub struct JobRunner {
    unit: Arc<dyn WorkUnit>,
    sink: Arc<dyn EventSink>,
}

impl JobRunner {
    pub fn new(unit: Arc<dyn WorkUnit>, sink: Arc<dyn EventSink>) -> Self {
        Self { unit, sink }
    }

    /// The sink attempts report to
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    /// Run one attempt
    ///
    /// Attempts units until the spec's remaining count reaches zero or a unit
    /// fails. A failing unit does not count as consumed, so the returned
    /// result always satisfies `completed + remaining == spec.remaining_units`.
    /// Cancellation is checked before every unit.
    #[instrument(skip(self, spec, cancel), fields(job_id = %spec.job_id, attempt = spec.attempt))]
    pub async fn run(
        &self,
        spec: JobSpec,
        handle: PendingHandle,
        cancel: CancellationToken,
    ) -> Result<JobResult, AttemptError> {
        let JobSpec {
            job_id,
            remaining_units: total,
            attempt,
        } = spec;
        let mut remaining = total;
        let mut completed = 0;

        if cancel.is_cancelled() {
            return Err(AttemptError::Cancelled {
                job_id,
                completed_units: completed,
                remaining_units: remaining,
            });
        }

        self.publish(
            JobEvent::Started {
                job_id: job_id.clone(),
                attempt,
                remaining,
            },
            completed,
            remaining,
        )?;

        let mut ctx = UnitContext::new(job_id.clone(), attempt, handle).with_cancellation(cancel);

        while remaining > 0 {
            if ctx.is_cancelled() {
                debug!(completed, remaining, "Cancellation requested, stopping attempt");
                return Err(AttemptError::Cancelled {
                    job_id,
                    completed_units: completed,
                    remaining_units: remaining,
                });
            }

            ctx.unit_index = completed;
            match self.unit.attempt(&ctx).await {
                Ok(UnitOutcome::Success { .. }) => {
                    remaining -= 1;
                    completed += 1;
                    self.publish(
                        JobEvent::Progress {
                            job_id: job_id.clone(),
                            completed,
                            remaining,
                            total,
                        },
                        completed,
                        remaining,
                    )?;
                }
                Ok(UnitOutcome::Failure { reason }) => {
                    debug!(%reason, completed, remaining, "Unit failed");
                    self.publish(
                        JobEvent::Failed {
                            job_id: job_id.clone(),
                            completed,
                            remaining,
                        },
                        completed,
                        remaining,
                    )?;
                    self.publish(
                        JobEvent::Exited {
                            job_id: job_id.clone(),
                            completed,
                        },
                        completed,
                        remaining,
                    )?;
                    return Ok(JobResult::failed(job_id, completed, remaining));
                }
                Err(UnitFault { message, .. }) => {
                    return Err(AttemptError::Fault {
                        job_id,
                        completed_units: completed,
                        remaining_units: remaining,
                        message,
                    });
                }
            }
        }

        self.publish(
            JobEvent::Exited {
                job_id: job_id.clone(),
                completed,
            },
            completed,
            remaining,
        )?;
        Ok(JobResult::completed(job_id, completed))
    }

    fn publish(&self, event: JobEvent, completed: u32, remaining: u32) -> Result<(), AttemptError> {
        self.sink
            .emit(&event)
            .map_err(|SinkError(message)| AttemptError::Fault {
                job_id: event.job_id().clone(),
                completed_units: completed,
                remaining_units: remaining,
                message,
            })
    }
}

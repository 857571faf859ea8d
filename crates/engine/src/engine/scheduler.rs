//! Revival scheduler
//!
//! Owns the worker pool and the registry of in-flight attempts. All state is
//! mutated from the single task driving [`RevivalScheduler::run_until`];
//! worker tasks only hand back completions through the pool's channel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::registry::{JobRegistry, RegistryError};
use super::report::{JobOutcome, JobStatus, RunReport};
use crate::config::{ConfigError, EngineConfig};
use crate::job::{
    AttemptError, EventSink, JobEvent, JobId, JobResult, JobRunner, JobSpec, SinkError,
};
use crate::reliability::RevivalPolicy;
use crate::unit::WorkUnit;
use crate::worker::{Completion, ShutdownMode, WorkerPool, WorkerPoolConfig, WorkerPoolError};

/// Errors that stop a run as a whole
///
/// Per-job problems (faults, exhausted revivals) never surface here; they
/// are recorded in the [`RunReport`].
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The same job id appeared twice in the initial set
    #[error("job {0} submitted more than once")]
    DuplicateJob(JobId),

    /// Worker pool error
    #[error("worker pool error: {0}")]
    Pool(#[from] WorkerPoolError),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Running totals for one logical job
#[derive(Debug, Default)]
struct JobLedger {
    attempts: u32,
    completed_units: u32,
    remaining_units: u32,
    last_result: Option<JobResult>,
}

enum Wake {
    Completion(Option<Completion>),
    Interrupt,
    DrainDeadline,
}

/// Keeps jobs running until they complete
///
/// # Example
///
/// ```ignore
/// use revive_engine::prelude::*;
///
/// let config = EngineConfig::default().with_pool_size(3);
/// let scheduler = RevivalScheduler::from_config(
///     &config,
///     Arc::new(config.simulated_work()),
///     Arc::new(TracingSink),
/// )?;
///
/// let report = scheduler
///     .run_to_completion(config.job_specs(["ingest", "index", "publish"]))
///     .await?;
/// assert!(report.all_completed());
/// ```
pub struct RevivalScheduler {
    pool: WorkerPool,
    registry: JobRegistry,
    policy: RevivalPolicy,
    sink: Arc<dyn EventSink>,
    ledgers: HashMap<JobId, JobLedger>,
    outcomes: BTreeMap<JobId, JobOutcome>,
}

impl RevivalScheduler {
    /// Create a scheduler with its own worker pool
    pub fn new(pool_config: WorkerPoolConfig, runner: JobRunner, policy: RevivalPolicy) -> Self {
        let sink = runner.sink();
        Self {
            pool: WorkerPool::new(pool_config, runner),
            registry: JobRegistry::new(),
            policy,
            sink,
            ledgers: HashMap::new(),
            outcomes: BTreeMap::new(),
        }
    }

    /// Create a scheduler from engine configuration
    pub fn from_config(
        config: &EngineConfig,
        unit: Arc<dyn WorkUnit>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::new(
            config.pool.clone(),
            JobRunner::new(unit, sink),
            config.revival.clone(),
        ))
    }

    /// Run every job until it completes, faults, or is abandoned
    pub async fn run_to_completion(self, specs: Vec<JobSpec>) -> Result<RunReport, SchedulerError> {
        self.run_until(specs, CancellationToken::new()).await
    }

    /// Run every job until it finishes or `shutdown` fires
    ///
    /// After `shutdown` fires no job is revived; in-flight attempts are asked
    /// to stop and drained for up to the pool's shutdown timeout. Jobs that
    /// did not complete are reported as [`JobStatus::Interrupted`].
    #[instrument(skip_all, fields(jobs = specs.len()))]
    pub async fn run_until(
        mut self,
        specs: Vec<JobSpec>,
        shutdown: CancellationToken,
    ) -> Result<RunReport, SchedulerError> {
        let started_at = Utc::now();
        ensure_unique(&specs)?;

        info!(
            jobs = specs.len(),
            max_concurrency = self.pool.config().max_concurrency,
            max_attempts = ?self.policy.max_attempts,
            "Starting revival run"
        );

        for spec in specs {
            if shutdown.is_cancelled() {
                self.interrupt_unlaunched(spec);
                continue;
            }
            self.launch(spec, Duration::ZERO, &shutdown).await?;
        }

        let mut interrupted = false;
        let mut drain_deadline: Option<Instant> = None;

        while !self.registry.is_empty() {
            // Placeholder deadline for the disabled branch; never awaited.
            let deadline = drain_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled(), if !interrupted => Wake::Interrupt,
                _ = tokio::time::sleep_until(deadline), if drain_deadline.is_some() => Wake::DrainDeadline,
                completion = self.pool.next_completion() => Wake::Completion(completion),
            };

            match wake {
                Wake::Interrupt => {
                    warn!(in_flight = self.registry.len(), "Run interrupted, cancelling attempts");
                    interrupted = true;
                    drain_deadline = Some(Instant::now() + self.pool.config().shutdown_timeout);
                    self.pool.cancel_all();
                }
                Wake::DrainDeadline => {
                    warn!(in_flight = self.registry.len(), "Drain deadline reached");
                    break;
                }
                Wake::Completion(Some(completion)) => {
                    self.observe(completion, interrupted, &shutdown).await?
                }
                Wake::Completion(None) => {
                    error!(
                        tracked = self.registry.len(),
                        "Worker pool has no outstanding attempts for tracked jobs"
                    );
                    break;
                }
            }
        }

        for (_, spec) in self.registry.drain() {
            self.retire(spec.job_id, JobStatus::Interrupted, None);
        }

        // An interrupted run only gets what is left of its drain deadline.
        let shutdown_result = match drain_deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                self.pool.shutdown_within(ShutdownMode::Cancel, left).await
            }
            None => self.pool.shutdown(ShutdownMode::Drain).await,
        };
        if let Err(e) = shutdown_result {
            warn!(error = %e, "Worker pool did not shut down cleanly");
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            jobs: std::mem::take(&mut self.outcomes),
        };

        info!(
            completed = report.count(JobStatus::Completed),
            abandoned = report.count(JobStatus::Abandoned),
            faulted = report.count(JobStatus::Faulted),
            interrupted = report.count(JobStatus::Interrupted),
            attempts = report.total_attempts(),
            "Revival run finished"
        );

        Ok(report)
    }

    /// Submit an attempt and start tracking it
    ///
    /// Waiting for admission gives way to `shutdown`; a job still waiting
    /// when it fires is retired as interrupted without being submitted.
    async fn launch(
        &mut self,
        spec: JobSpec,
        delay: Duration,
        shutdown: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        self.registry.ensure_idle(&spec.job_id)?;

        let submitted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            handle = self.pool.submit_after(spec.clone(), delay) => Some(handle?),
        };
        let Some(handle) = submitted else {
            debug!(job_id = %spec.job_id, attempt = spec.attempt, "Interrupted before admission");
            self.interrupt_unlaunched(spec);
            return Ok(());
        };

        let ledger = self.ledgers.entry(spec.job_id.clone()).or_default();
        ledger.attempts += 1;
        ledger.remaining_units = spec.remaining_units;

        debug!(%handle, job_id = %spec.job_id, attempt = spec.attempt, "Attempt tracked");
        self.registry.insert(handle, spec)?;
        Ok(())
    }

    /// Retire a job whose next attempt never reached the pool
    fn interrupt_unlaunched(&mut self, spec: JobSpec) {
        self.ledgers.entry(spec.job_id.clone()).or_default().remaining_units =
            spec.remaining_units;
        self.retire(spec.job_id, JobStatus::Interrupted, None);
    }

    /// Handle one completion; removes its registry entry exactly once
    async fn observe(
        &mut self,
        completion: Completion,
        interrupted: bool,
        shutdown: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        let Some(spec) = self.registry.remove(&completion.handle) else {
            warn!(handle = %completion.handle, "Completion for untracked attempt");
            return Ok(());
        };

        match completion.result {
            Ok(result) => {
                self.record(&spec.job_id, result.completed_units(), result.remaining_units());

                if result.is_completed() {
                    debug!(job_id = %spec.job_id, attempts = spec.attempt, "Job completed");
                    self.set_last_result(&spec.job_id, result);
                    self.retire(spec.job_id, JobStatus::Completed, None);
                } else if interrupted {
                    self.set_last_result(&spec.job_id, result);
                    self.retire(spec.job_id, JobStatus::Interrupted, None);
                } else if self.policy.has_attempts_remaining(spec.attempt) {
                    let next = spec.revive(&result);
                    self.set_last_result(&spec.job_id, result);
                    self.revive(next, shutdown).await?;
                } else {
                    self.set_last_result(&spec.job_id, result);
                    self.abandon(spec);
                }
            }
            Err(err) => {
                self.record(&spec.job_id, err.completed_units(), err.remaining_units());
                match err {
                    AttemptError::Fault { message, .. } => self.fault(spec.job_id, message),
                    AttemptError::Cancelled { .. } => {
                        self.retire(spec.job_id, JobStatus::Interrupted, None)
                    }
                }
            }
        }

        Ok(())
    }

    async fn revive(
        &mut self,
        next: JobSpec,
        shutdown: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        let event = JobEvent::Revived {
            job_id: next.job_id.clone(),
            remaining: next.remaining_units,
            attempt: next.attempt,
        };
        if let Err(SinkError(message)) = self.sink.emit(&event) {
            self.fault(next.job_id, message);
            return Ok(());
        }

        let delay = self.policy.delay_for_attempt(next.attempt);
        self.launch(next, delay, shutdown).await
    }

    fn abandon(&mut self, spec: JobSpec) {
        let remaining = self
            .ledgers
            .get(&spec.job_id)
            .map_or(spec.remaining_units, |ledger| ledger.remaining_units);
        let event = JobEvent::Abandoned {
            job_id: spec.job_id.clone(),
            remaining,
            attempts: spec.attempt,
        };
        if let Err(e) = self.sink.emit(&event) {
            warn!(job_id = %spec.job_id, error = %e, "Could not report abandoned job");
        }
        self.retire(spec.job_id, JobStatus::Abandoned, None);
    }

    fn fault(&mut self, job_id: JobId, message: String) {
        let event = JobEvent::Faulted {
            job_id: job_id.clone(),
            message: message.clone(),
        };
        if let Err(e) = self.sink.emit(&event) {
            warn!(%job_id, error = %e, "Could not report faulted job");
        }
        self.retire(job_id, JobStatus::Faulted, Some(message));
    }

    fn record(&mut self, job_id: &JobId, completed: u32, remaining: u32) {
        let ledger = self.ledgers.entry(job_id.clone()).or_default();
        ledger.completed_units += completed;
        ledger.remaining_units = remaining;
    }

    fn set_last_result(&mut self, job_id: &JobId, result: JobResult) {
        self.ledgers.entry(job_id.clone()).or_default().last_result = Some(result);
    }

    fn retire(&mut self, job_id: JobId, status: JobStatus, fault: Option<String>) {
        let ledger = self.ledgers.remove(&job_id).unwrap_or_default();
        self.outcomes.insert(
            job_id.clone(),
            JobOutcome {
                job_id,
                status,
                attempts: ledger.attempts,
                completed_units: ledger.completed_units,
                remaining_units: ledger.remaining_units,
                last_result: ledger.last_result,
                fault,
            },
        );
    }
}

fn ensure_unique(specs: &[JobSpec]) -> Result<(), SchedulerError> {
    let mut seen = HashSet::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(&spec.job_id) {
            return Err(SchedulerError::DuplicateJob(spec.job_id.clone()));
        }
    }
    Ok(())
}

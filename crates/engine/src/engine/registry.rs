//! Registry of in-flight attempts

use std::collections::HashMap;

use crate::job::{JobId, JobSpec};
use crate::worker::PendingHandle;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The job already has an attempt in flight
    #[error("job {job_id} already has attempt {handle} in flight")]
    AlreadyInFlight { job_id: JobId, handle: PendingHandle },

    /// The handle is already registered
    #[error("handle {0} already registered")]
    DuplicateHandle(PendingHandle),
}

/// Maps pending handles to the specs they are running
///
/// Holds at most one attempt per job. An entry is removed exactly once, when
/// the scheduler observes the attempt's completion.
#[derive(Debug, Default)]
pub struct JobRegistry {
    attempts: HashMap<PendingHandle, JobSpec>,
    in_flight: HashMap<JobId, PendingHandle>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if the job already has an attempt in flight
    pub fn ensure_idle(&self, job_id: &JobId) -> Result<(), RegistryError> {
        match self.in_flight.get(job_id) {
            Some(handle) => Err(RegistryError::AlreadyInFlight {
                job_id: job_id.clone(),
                handle: *handle,
            }),
            None => Ok(()),
        }
    }

    /// Track a newly submitted attempt
    pub fn insert(&mut self, handle: PendingHandle, spec: JobSpec) -> Result<(), RegistryError> {
        if self.attempts.contains_key(&handle) {
            return Err(RegistryError::DuplicateHandle(handle));
        }
        self.ensure_idle(&spec.job_id)?;

        self.in_flight.insert(spec.job_id.clone(), handle);
        self.attempts.insert(handle, spec);
        Ok(())
    }

    /// Stop tracking an attempt whose completion was observed
    pub fn remove(&mut self, handle: &PendingHandle) -> Option<JobSpec> {
        let spec = self.attempts.remove(handle)?;
        self.in_flight.remove(&spec.job_id);
        Some(spec)
    }

    pub fn get(&self, handle: &PendingHandle) -> Option<&JobSpec> {
        self.attempts.get(handle)
    }

    /// Whether the job has an attempt in flight
    pub fn contains_job(&self, job_id: &JobId) -> bool {
        self.in_flight.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Remove and return every tracked attempt
    pub fn drain(&mut self) -> Vec<(PendingHandle, JobSpec)> {
        self.in_flight.clear();
        self.attempts.drain().collect()
    }
}

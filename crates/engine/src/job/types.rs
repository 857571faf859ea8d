//! Job identity, specs and results

use serde::{Deserialize, Serialize};

/// Identity of a logical job
///
/// Assigned by the caller. Integer ids are stored as their decimal form so
/// `JobId::from(7u64) == JobId::from("7")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a job id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<u32> for JobId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

/// Work handed to one attempt of a job
///
/// Immutable once submitted; a revival builds a new spec with
/// [`JobSpec::revive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: JobId,

    /// Units still to attempt
    pub remaining_units: u32,

    /// Attempt number of the logical job (1-based)
    pub attempt: u32,
}

impl JobSpec {
    /// Spec for the first attempt of a job
    pub fn new(job_id: impl Into<JobId>, remaining_units: u32) -> Self {
        Self {
            job_id: job_id.into(),
            remaining_units,
            attempt: 1,
        }
    }

    /// Override the attempt number
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
        self
    }

    /// Spec for the next attempt after `result` failed
    pub fn revive(&self, result: &JobResult) -> Self {
        Self {
            job_id: self.job_id.clone(),
            remaining_units: result.remaining_units,
            attempt: self.attempt + 1,
        }
    }
}

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// All assigned units finished
    Completed,

    /// A unit failed; some units remain
    Failed,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What one attempt achieved
///
/// `outcome == Completed` exactly when `remaining_units == 0`. The fields are
/// read-only outside this module so the constructors keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    job_id: JobId,
    completed_units: u32,
    remaining_units: u32,
    outcome: AttemptOutcome,
}

impl JobResult {
    /// Result of an attempt that finished every assigned unit
    pub fn completed(job_id: JobId, completed_units: u32) -> Self {
        Self {
            job_id,
            completed_units,
            remaining_units: 0,
            outcome: AttemptOutcome::Completed,
        }
    }

    /// Result of an attempt stopped by a failing unit
    ///
    /// A failed attempt always leaves at least one unit; `remaining_units` is
    /// raised to 1 if given as 0.
    pub fn failed(job_id: JobId, completed_units: u32, remaining_units: u32) -> Self {
        debug_assert!(remaining_units > 0, "failed attempt with no remaining units");
        Self {
            job_id,
            completed_units,
            remaining_units: remaining_units.max(1),
            outcome: AttemptOutcome::Failed,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Units finished by this attempt
    pub fn completed_units(&self) -> u32 {
        self.completed_units
    }

    /// Units left for a later attempt
    pub fn remaining_units(&self) -> u32 {
        self.remaining_units
    }

    pub fn outcome(&self) -> AttemptOutcome {
        self.outcome
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == AttemptOutcome::Completed
    }

    /// Units the attempt was assigned (`completed + remaining`)
    pub fn assigned_units(&self) -> u32 {
        self.completed_units + self.remaining_units
    }
}

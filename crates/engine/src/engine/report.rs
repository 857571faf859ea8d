//! Final outcome of a revival run

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobResult};

/// Terminal status of a logical job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every unit finished
    Completed,

    /// The revival policy ran out of attempts
    Abandoned,

    /// A collaborator fault ended the job
    Faulted,

    /// The run was interrupted while the job was still cycling
    Interrupted,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Faulted => write!(f, "faulted"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// What happened to one logical job across all its attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,

    /// Attempts that ran (or were cut short)
    pub attempts: u32,

    /// Units finished across all attempts
    pub completed_units: u32,

    /// Units never finished
    pub remaining_units: u32,

    /// Result of the last attempt that produced one
    pub last_result: Option<JobResult>,

    /// Fault message, for faulted jobs
    pub fault: Option<String>,
}

/// Per-job outcomes of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Outcomes keyed by job id
    pub jobs: BTreeMap<JobId, JobOutcome>,
}

impl RunReport {
    pub fn get(&self, job_id: &JobId) -> Option<&JobOutcome> {
        self.jobs.get(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs that ended with the given status
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs
            .values()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    /// Whether every job completed
    pub fn all_completed(&self) -> bool {
        self.jobs
            .values()
            .all(|outcome| outcome.status == JobStatus::Completed)
    }

    /// Whether any job faulted or was abandoned
    pub fn has_failures(&self) -> bool {
        self.jobs
            .values()
            .any(|outcome| matches!(outcome.status, JobStatus::Faulted | JobStatus::Abandoned))
    }

    /// Total attempts across jobs
    pub fn total_attempts(&self) -> u32 {
        self.jobs.values().map(|outcome| outcome.attempts).sum()
    }

    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(job: &str, status: JobStatus, attempts: u32) -> JobOutcome {
        JobOutcome {
            job_id: JobId::from(job),
            status,
            attempts,
            completed_units: 5,
            remaining_units: 0,
            last_result: None,
            fault: None,
        }
    }

    fn report(outcomes: Vec<JobOutcome>) -> RunReport {
        let now = Utc::now();
        RunReport {
            started_at: now,
            finished_at: now,
            jobs: outcomes
                .into_iter()
                .map(|outcome| (outcome.job_id.clone(), outcome))
                .collect(),
        }
    }

    #[test]
    fn test_counts() {
        let report = report(vec![
            outcome("a", JobStatus::Completed, 2),
            outcome("b", JobStatus::Completed, 1),
            outcome("c", JobStatus::Interrupted, 4),
        ]);

        assert_eq!(report.len(), 3);
        assert_eq!(report.count(JobStatus::Completed), 2);
        assert_eq!(report.count(JobStatus::Interrupted), 1);
        assert_eq!(report.total_attempts(), 7);
        assert!(!report.all_completed());
        assert!(!report.has_failures());
    }

    #[test]
    fn test_failures() {
        let report = report(vec![
            outcome("a", JobStatus::Completed, 1),
            outcome("b", JobStatus::Faulted, 1),
        ]);
        assert!(report.has_failures());
        assert_eq!(
            report.get(&JobId::from("b")).unwrap().status,
            JobStatus::Faulted
        );
    }

    #[test]
    fn test_empty_report_is_complete() {
        let report = report(vec![]);
        assert!(report.is_empty());
        assert!(report.all_completed());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(JobStatus::Interrupted).unwrap(),
            "interrupted"
        );
        assert_eq!(JobStatus::Abandoned.to_string(), "abandoned");
    }
}

//! Progress events and the sinks that consume them

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::JobId;

/// Progress event emitted while jobs run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// An attempt started
    Started {
        job_id: JobId,
        attempt: u32,
        remaining: u32,
    },

    /// A unit finished
    Progress {
        job_id: JobId,
        completed: u32,
        remaining: u32,
        total: u32,
    },

    /// A unit failed and stopped the attempt
    Failed {
        job_id: JobId,
        completed: u32,
        remaining: u32,
    },

    /// An attempt ended, successfully or not
    Exited { job_id: JobId, completed: u32 },

    /// The scheduler resubmitted a failed job
    Revived {
        job_id: JobId,
        remaining: u32,
        attempt: u32,
    },

    /// The revival policy gave up on a job
    Abandoned {
        job_id: JobId,
        remaining: u32,
        attempts: u32,
    },

    /// A collaborator fault ended a job
    Faulted { job_id: JobId, message: String },
}

impl JobEvent {
    /// Job the event belongs to
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Exited { job_id, .. }
            | Self::Revived { job_id, .. }
            | Self::Abandoned { job_id, .. }
            | Self::Faulted { job_id, .. } => job_id,
        }
    }

    /// Short event name, matching the serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Progress { .. } => "progress",
            Self::Failed { .. } => "failed",
            Self::Exited { .. } => "exited",
            Self::Revived { .. } => "revived",
            Self::Abandoned { .. } => "abandoned",
            Self::Faulted { .. } => "faulted",
        }
    }
}

/// Error raised by a sink that could not take an event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event sink failed: {0}")]
pub struct SinkError(pub String);

/// Consumer of job events
///
/// Sinks are called from worker tasks, so they must be cheap and must not
/// block. A sink error is treated as a collaborator fault for the job that
/// emitted the event.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: &JobEvent) -> Result<(), SinkError>;
}

/// Sink that forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &JobEvent) -> Result<(), SinkError> {
        match event {
            JobEvent::Started {
                job_id,
                attempt,
                remaining,
            } => info!(%job_id, attempt, remaining, "Job started"),
            JobEvent::Progress {
                job_id,
                completed,
                remaining,
                total,
            } => debug!(%job_id, completed, remaining, total, "Job progress"),
            JobEvent::Failed {
                job_id,
                completed,
                remaining,
            } => warn!(%job_id, completed, remaining, "Job crashed"),
            JobEvent::Exited { job_id, completed } => info!(%job_id, completed, "Job exited"),
            JobEvent::Revived {
                job_id,
                remaining,
                attempt,
            } => info!(%job_id, remaining, attempt, "Reviving job"),
            JobEvent::Abandoned {
                job_id,
                remaining,
                attempts,
            } => warn!(%job_id, remaining, attempts, "Abandoning job"),
            JobEvent::Faulted { job_id, message } => error!(%job_id, %message, "Job faulted"),
        }
        Ok(())
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &JobEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that records events in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<JobEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }

    /// Recorded events of one job
    pub fn events_for(&self, job_id: &JobId) -> Vec<JobEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.job_id() == job_id)
            .cloned()
            .collect()
    }

    /// Number of recorded events with the given name
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &JobEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revived(job: &str) -> JobEvent {
        JobEvent::Revived {
            job_id: JobId::from(job),
            remaining: 3,
            attempt: 2,
        }
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(revived("a")).unwrap();
        assert_eq!(json["event"], "revived");
        assert_eq!(json["job_id"], "a");
        assert_eq!(json["remaining"], 3);

        let parsed: JobEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.name(), "revived");
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(&JobEvent::Exited {
            job_id: JobId::from("a"),
            completed: 1,
        })
        .unwrap();
        sink.emit(&revived("b")).unwrap();
        sink.emit(&revived("a")).unwrap();

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events_for(&JobId::from("a")).len(), 2);
        assert_eq!(sink.count("revived"), 2);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_tracing_and_null_sinks_accept_everything() {
        let event = JobEvent::Faulted {
            job_id: JobId::from("a"),
            message: "boom".to_string(),
        };
        assert!(TracingSink.emit(&event).is_ok());
        assert!(NullSink.emit(&event).is_ok());
    }
}

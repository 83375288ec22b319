//! Event types for lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobState};

/// Events emitted by the coordinator as jobs move through their lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was durably accepted.
    JobCreated { job: Job, timestamp: DateTime<Utc> },
    /// A job was handed to the bus.
    JobDispatched {
        job_id: JobId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A dispatch attempt failed.
    DispatchFailed {
        job_id: JobId,
        attempt: u32,
        error: String,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A worker reported it started the job.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job reached a terminal state.
    JobFinished {
        job_id: JobId,
        state: JobState,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCreated { timestamp, .. } => *timestamp,
            JobEvent::JobDispatched { timestamp, .. } => *timestamp,
            JobEvent::DispatchFailed { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobCreated { job, .. } => job.id,
            JobEvent::JobDispatched { job_id, .. } => *job_id,
            JobEvent::DispatchFailed { job_id, .. } => *job_id,
            JobEvent::JobStarted { job_id, .. } => *job_id,
            JobEvent::JobFinished { job_id, .. } => *job_id,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobCreated { job, .. } => {
                format!("Job {} created ({})", job.id, job.job_type)
            }
            JobEvent::JobDispatched {
                job_id, attempt, ..
            } => format!("Job {} dispatched (attempt {})", job_id, attempt),
            JobEvent::DispatchFailed {
                job_id,
                attempt,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!(
                    "Job {} dispatch attempt {} failed: {}{}",
                    job_id, attempt, error, retry
                )
            }
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobFinished { job_id, state, .. } => {
                format!("Job {} -> {}", job_id, state)
            }
        }
    }
}

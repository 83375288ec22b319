//! Job-execution messages and the publisher contract.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobType};

/// Message handed to the worker pool for one job.
///
/// Carries only what a worker needs to execute the job. Messages are keyed by
/// `job_id` so every message for a job lands in the same ordered partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// The job payload as JSON text.
    pub payload: String,
    /// Creation time in seconds since the Unix epoch (UTC).
    pub created_at: i64,
}

impl DispatchMessage {
    pub fn from_job(job: &Job) -> Result<Self, DispatchError> {
        Ok(Self {
            job_id: job.id,
            job_type: job.job_type,
            payload: serde_json::to_string(&job.payload)?,
            created_at: job.created_at.timestamp(),
        })
    }

    /// Partition key for this message.
    pub fn key(&self) -> String {
        self.job_id.to_string()
    }
}

/// Serialize the dispatch-relevant fields of a job into a message body.
pub fn encode_dispatch(job: &Job) -> Result<Vec<u8>, DispatchError> {
    let message = DispatchMessage::from_job(job)?;
    Ok(serde_json::to_vec(&message)?)
}

/// Decode a message body produced by [`encode_dispatch`].
pub fn decode_dispatch(bytes: &[u8]) -> Result<DispatchMessage, DispatchError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Channel closed: {0}")]
    Closed(String),
    #[error("Publish failed: {0}")]
    Publish(String),
    #[error("Publish timed out after {0}ms")]
    Timeout(u64),
}

/// Pushes job-execution messages onto the worker channel.
///
/// Delivery is at-least-once: a call may fail or time out after the message
/// was already accepted, so callers must be prepared to dispatch again.
pub trait DispatchPublisher: Send + Sync + 'static {
    fn dispatch(&self, job: &Job) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_carries_json_payload_and_epoch_seconds() {
        let job = Job::new(JobId::new(), JobType::HttpGet, json!({ "url": "https://example.com" }));
        let bytes = encode_dispatch(&job).unwrap();
        let message = decode_dispatch(&bytes).unwrap();

        assert_eq!(message.job_id, job.id);
        assert_eq!(message.job_type, JobType::HttpGet);
        assert_eq!(message.created_at, job.created_at.timestamp());
        let payload: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(payload, job.payload);
        assert_eq!(message.key(), job.id.to_string());
    }

    #[test]
    fn unknown_type_is_sent_as_unknown() {
        let job = Job::new(JobId::new(), JobType::parse("transcode"), json!({}));
        let value: serde_json::Value = serde_json::from_slice(&encode_dispatch(&job).unwrap()).unwrap();
        assert_eq!(value["type"], json!("UNKNOWN"));
    }
}

//! Job submission and query endpoint.

use actors::Coordinator;
use queue_core::{DispatchPublisher, Job, JobId, JobStore};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ApiError;

/// Request type for creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default)]
    pub payload: Option<JsonValue>,
}

/// A successful response with its HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub status: u16,
    pub body: T,
}

impl<T> Response<T> {
    pub fn ok(body: T) -> Self {
        Self { status: 200, body }
    }

    pub fn accepted(body: T) -> Self {
        Self { status: 202, body }
    }
}

/// Transport-neutral bindings for `POST /jobs`, `GET /jobs/{id}` and `GET /jobs`.
pub struct JobsApi<S, P> {
    coordinator: Coordinator<S, P>,
}

impl<S, P> Clone for JobsApi<S, P> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S: JobStore, P: DispatchPublisher> JobsApi<S, P> {
    pub fn new(coordinator: Coordinator<S, P>) -> Self {
        Self { coordinator }
    }

    /// Submit a job. Answers `202 Accepted` once the job is durable.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<Response<Job>, ApiError> {
        let job = self
            .coordinator
            .submit(&request.job_type, request.payload)
            .await?;
        Ok(Response::accepted(job))
    }

    pub async fn get_job(&self, id: &str) -> Result<Response<Job>, ApiError> {
        let job_id = JobId::parse(id.trim())
            .map_err(|e| ApiError::bad_request(format!("Invalid job ID: {}", e)))?;
        let job = self.coordinator.get(job_id).await?;
        Ok(Response::ok(job))
    }

    pub async fn list_jobs(&self) -> Result<Response<Vec<Job>>, ApiError> {
        let jobs = self.coordinator.list().await?;
        Ok(Response::ok(jobs))
    }
}

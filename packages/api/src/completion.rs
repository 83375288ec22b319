//! Inbound worker status RPC.
//!
//! Workers report progress and terminal outcomes here. The receiver never
//! touches the store itself; every report goes through the coordinator.

use actors::Coordinator;
use queue_core::{DispatchPublisher, JobId, JobStore, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::RpcStatus;

/// Error detail recorded when a worker reports failure without a message.
const MISSING_ERROR_DETAIL: &str = "worker reported failure without detail";

/// Status a worker reports for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedStatus {
    #[default]
    Unspecified,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub job_id: String,
    #[serde(default)]
    pub status: ReportedStatus,
    /// Result for `COMPLETED`. JSON text, or plain text kept as a string.
    #[serde(default)]
    pub result: String,
    /// Error detail for `FAILED`.
    #[serde(default)]
    pub error_message: String,
    /// Reporting worker, required for `IN_PROGRESS`.
    #[serde(default)]
    pub worker_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJobStatusResponse {
    pub success: bool,
}

/// Completion receiver bound to a coordinator.
pub struct CompletionReceiver<S, P> {
    coordinator: Coordinator<S, P>,
}

impl<S, P> Clone for CompletionReceiver<S, P> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S: JobStore, P: DispatchPublisher> CompletionReceiver<S, P> {
    pub fn new(coordinator: Coordinator<S, P>) -> Self {
        Self { coordinator }
    }

    /// Handle `UpdateJobStatus`.
    pub async fn update_job_status(
        &self,
        request: UpdateJobStatusRequest,
    ) -> Result<UpdateJobStatusResponse, RpcStatus> {
        let job_id = parse_job_id(&request.job_id)?;

        match request.status {
            ReportedStatus::Unspecified => {
                return Err(RpcStatus::invalid_argument("status must be specified"));
            }
            ReportedStatus::InProgress => {
                self.coordinator
                    .report_progress(job_id, &request.worker_id)
                    .await?;
            }
            ReportedStatus::Completed => {
                let outcome = Outcome::completed(parse_result(&request.result));
                self.coordinator.apply_completion(job_id, outcome).await?;
            }
            ReportedStatus::Failed => {
                let detail = if request.error_message.trim().is_empty() {
                    MISSING_ERROR_DETAIL.to_string()
                } else {
                    request.error_message
                };
                self.coordinator
                    .apply_completion(job_id, Outcome::failed(detail))
                    .await?;
            }
        }

        Ok(UpdateJobStatusResponse { success: true })
    }

    /// Worker heartbeat.
    pub async fn report_progress(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> Result<UpdateJobStatusResponse, RpcStatus> {
        let job_id = parse_job_id(job_id)?;
        self.coordinator.report_progress(job_id, worker_id).await?;
        Ok(UpdateJobStatusResponse { success: true })
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, RpcStatus> {
    JobId::parse(raw.trim())
        .map_err(|e| RpcStatus::invalid_argument(format!("Invalid job ID '{}': {}", raw, e)))
}

/// Interpret a reported result: JSON when it parses, otherwise the raw text.
pub fn parse_result(text: &str) -> JsonValue {
    if text.trim().is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string()))
}

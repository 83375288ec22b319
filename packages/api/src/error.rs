//! Mapping of coordinator failures onto transport status codes.

use actors::CoordinatorError;
use serde::{Deserialize, Serialize};

/// Error body returned by the submission and query endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Stable machine-readable code.
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "invalid_request", message)
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        match err {
            CoordinatorError::InvalidRequest(_) => Self::new(400, "invalid_request", message),
            CoordinatorError::NotFound(_) => Self::new(404, "not_found", message),
            CoordinatorError::Conflict(_) => Self::new(409, "conflict", message),
            CoordinatorError::Persistence(_) => Self::new(503, "persistence_unavailable", message),
            CoordinatorError::Dispatch(_) => Self::new(502, "dispatch_failed", message),
        }
    }
}

/// Status code of an RPC failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Unavailable,
    Internal,
}

/// Failure returned by the completion RPC surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct RpcStatus {
    pub code: RpcCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(RpcCode::InvalidArgument, message)
    }
}

impl From<CoordinatorError> for RpcStatus {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        let code = match err {
            CoordinatorError::InvalidRequest(_) => RpcCode::InvalidArgument,
            CoordinatorError::NotFound(_) => RpcCode::NotFound,
            CoordinatorError::Conflict(_) => RpcCode::FailedPrecondition,
            CoordinatorError::Persistence(_) => RpcCode::Unavailable,
            CoordinatorError::Dispatch(_) => RpcCode::Internal,
        };
        Self { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{DispatchError, JobId, JobState, TransitionError};

    fn taxonomy() -> Vec<CoordinatorError> {
        let id = JobId::new();
        vec![
            CoordinatorError::InvalidRequest("payload is required".into()),
            CoordinatorError::NotFound(id),
            CoordinatorError::Conflict(TransitionError::AlreadyTerminal {
                job_id: id,
                current: JobState::Completed,
                reported: JobState::Failed,
            }),
            CoordinatorError::Persistence("timed out".into()),
            CoordinatorError::Dispatch(DispatchError::Publish("down".into())),
        ]
    }

    #[test]
    fn coordinator_errors_map_to_http_status() {
        let statuses: Vec<u16> = taxonomy()
            .into_iter()
            .map(|e| ApiError::from(e).status)
            .collect();
        assert_eq!(statuses, vec![400, 404, 409, 503, 502]);
    }

    #[test]
    fn coordinator_errors_map_to_rpc_codes() {
        let codes: Vec<RpcCode> = taxonomy()
            .into_iter()
            .map(|e| RpcStatus::from(e).code)
            .collect();
        assert_eq!(
            codes,
            vec![
                RpcCode::InvalidArgument,
                RpcCode::NotFound,
                RpcCode::FailedPrecondition,
                RpcCode::Unavailable,
                RpcCode::Internal,
            ]
        );
    }

    #[test]
    fn error_body_keeps_message() {
        let err = ApiError::from(CoordinatorError::Persistence("store down".into()));
        assert_eq!(err.code, "persistence_unavailable");
        assert!(err.message.contains("store down"));
    }
}

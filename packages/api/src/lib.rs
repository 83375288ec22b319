//! Transport bindings for the job lifecycle service.
//!
//! This crate contains the request/response types and handlers for:
//! - Job submission and queries (`JobsApi`)
//! - Worker status reports (`CompletionReceiver`)
//! - Service configuration and startup (`init_job_queue`)
//!
//! Handlers are transport-neutral: they return status codes and bodies and
//! leave routing to the embedding server.

mod completion;
mod error;
mod init;
mod jobs;

pub use completion::{
    CompletionReceiver, ReportedStatus, UpdateJobStatusRequest, UpdateJobStatusResponse,
    parse_result,
};
pub use error::{ApiError, RpcCode, RpcStatus};
pub use init::*;
pub use jobs::{CreateJobRequest, JobsApi, Response};

// Re-export core types for convenience
pub use queue_core::{Job, JobEvent, JobId, JobState, JobStatus, JobType};

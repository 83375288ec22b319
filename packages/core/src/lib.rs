//! Core domain types for the job lifecycle coordinator.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and the lifecycle transitions
//! - The store and publisher contracts the coordinator depends on
//! - Dispatch messages and the retry policy
//! - Events for lifecycle notifications

mod dispatch;
mod events;
mod job;
mod retry;
mod store;

pub use dispatch::{DispatchError, DispatchMessage, DispatchPublisher, decode_dispatch, encode_dispatch};
pub use events::JobEvent;
pub use job::{Change, Job, JobId, JobState, JobStatus, JobType, Outcome, TransitionError};
pub use retry::RetryPolicy;
pub use store::{JobStore, StoreError};

//! Lifecycle coordination for the job service.
//!
//! This crate owns the job state machine and the Ractor-based retry lane
//! that keeps undelivered jobs moving.
//!
//! # Architecture
//!
//! - `Coordinator` - Accepts submissions, dispatches them, and applies
//!   completion reports through the job store
//! - `DispatchReconciler` - Timer-driven actor that re-dispatches jobs whose
//!   publish failed or never happened
//!
//! # Usage
//!
//! ```ignore
//! use actors::{Coordinator, CoordinatorConfig, start_reconciler};
//!
//! let coordinator = Coordinator::new(store, publisher, CoordinatorConfig::default());
//! let (reconciler, handle) = start_reconciler(coordinator.clone()).await?;
//!
//! let job = coordinator.submit("SLEEP", Some(json!({ "duration_ms": 3000 }))).await?;
//! ```

mod config;
mod coordinator;
mod messages;
mod reconciler;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorError, ReconcileReport};
pub use messages::ReconcilerMessage;
pub use reconciler::{DispatchReconciler, ReconcilerState, reconcile_now, start_reconciler};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};

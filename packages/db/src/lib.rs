//! Job Store implementations for the lifecycle coordinator.
//!
//! This crate provides database connectivity and the [`queue_core::JobStore`]
//! implementations that persist jobs.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod locks;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use locks::KeyedLocks;
pub use repositories::{MemoryJobStore, SurrealJobStore};
pub use schema::init_schema;

//! Job store implementations.

mod job_repo;
mod memory_repo;

pub use job_repo::SurrealJobStore;
pub use memory_repo::MemoryJobStore;

use db::{DbConfig, DbError, MemoryJobStore, SurrealJobStore};

/// Fresh SurrealDB store on its own in-memory instance.
pub async fn surreal_store() -> Result<SurrealJobStore, DbError> {
    SurrealJobStore::connect(&DbConfig::memory()).await
}

pub fn memory_store() -> MemoryJobStore {
    MemoryJobStore::new()
}

//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates the job table, its fields, and indexes. Safe to run on every
/// startup.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// The job document is stored as JSON text under `body`; `state` and
/// `version` are top-level so they can be indexed and used for
/// compare-and-swap writes.
const JOB_SCHEMA: &str = r#"
-- Job table, one record per job keyed by its ULID
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS state ON job TYPE string;
DEFINE FIELD IF NOT EXISTS version ON job TYPE int;
DEFINE FIELD IF NOT EXISTS body ON job TYPE string;

-- Retry lane scans jobs by state
DEFINE INDEX IF NOT EXISTS job_state ON job FIELDS state;
"#;

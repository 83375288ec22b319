use std::time::Duration;

use api::{AppConfig, InitError, JobQueue, init_job_queue};
use actors::CoordinatorConfig;

/// Start a full service on an in-memory database.
pub async fn start() -> Result<JobQueue, InitError> {
    let config = AppConfig {
        coordinator: CoordinatorConfig::default()
            .with_reconcile_interval(Duration::from_millis(50)),
        ..AppConfig::default()
    };
    init_job_queue(config).await
}

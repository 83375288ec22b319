use api::{AppConfig, init_job_queue};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configurable via RUST_LOG.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;
    let queue = init_job_queue(config).await?;

    tokio::signal::ctrl_c().await?;
    queue.shutdown().await;
    Ok(())
}

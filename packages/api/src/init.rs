//! Server initialization for the job lifecycle service.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use actors::{ActorRef, Coordinator, CoordinatorConfig, ReconcilerMessage, start_reconciler};
use bus::{BusConfig, BusError, BusPublisher, MessageBus};
use db::{DbConfig, DbError, SurrealJobStore};
use queue_core::RetryPolicy;

use crate::completion::CompletionReceiver;
use crate::jobs::JobsApi;

/// Coordinator wired to the production store and bus.
pub type AppCoordinator = Coordinator<SurrealJobStore, BusPublisher>;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("database: {0}")]
    Db(#[from] DbError),
    #[error("bus: {0}")]
    Bus(#[from] BusError),
    #[error("failed to start reconciler: {0}")]
    Spawn(String),
}

/// Configuration for the whole service.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub db: DbConfig,
    pub bus: BusConfig,
    pub coordinator: CoordinatorConfig,
}

impl AppConfig {
    /// Build a config from environment variables.
    ///
    /// Database:
    /// - `JOBS_DB_ENDPOINT` (default: `mem://`)
    /// - `JOBS_DB_NAMESPACE` (default: `jobs`)
    /// - `JOBS_DB_DATABASE` (default: `main`)
    /// - `JOBS_DB_USERNAME`, `JOBS_DB_PASSWORD` (optional root credentials)
    ///
    /// Bus:
    /// - `JOBS_BUS_TOPIC` (default: `job-dispatch`)
    /// - `JOBS_BUS_PARTITIONS` (default: `4`)
    ///
    /// Coordinator:
    /// - `JOBS_STORE_TIMEOUT_MS` (default: `5000`)
    /// - `JOBS_DISPATCH_TIMEOUT_MS` (default: `5000`)
    /// - `JOBS_DISPATCH_MAX_ATTEMPTS` (default: `5`)
    /// - `JOBS_RECONCILE_INTERVAL_MS` (default: `1000`)
    pub fn from_env() -> Result<Self, InitError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InitError> {
        let var = |name: &str| lookup(name).and_then(non_empty);
        let mut cfg = Self::default();

        if let Some(endpoint) = var("JOBS_DB_ENDPOINT") {
            cfg.db = cfg.db.with_endpoint(endpoint);
        }
        if let Some(namespace) = var("JOBS_DB_NAMESPACE") {
            cfg.db = cfg.db.with_namespace(namespace);
        }
        if let Some(database) = var("JOBS_DB_DATABASE") {
            cfg.db = cfg.db.with_database(database);
        }
        match (var("JOBS_DB_USERNAME"), var("JOBS_DB_PASSWORD")) {
            (Some(user), Some(pass)) => cfg.db = cfg.db.with_credentials(user, pass),
            (None, None) => {}
            _ => {
                return Err(InitError::Config(
                    "JOBS_DB_USERNAME and JOBS_DB_PASSWORD must be set together".to_string(),
                ));
            }
        }

        if let Some(topic) = var("JOBS_BUS_TOPIC") {
            cfg.bus.topic = topic;
        }
        if let Some(partitions) = parse_var::<usize>("JOBS_BUS_PARTITIONS", var("JOBS_BUS_PARTITIONS"))? {
            cfg.bus.partitions = partitions;
        }
        cfg.bus
            .validate()
            .map_err(|e| InitError::Config(e.to_string()))?;

        if let Some(ms) = parse_var::<u64>("JOBS_STORE_TIMEOUT_MS", var("JOBS_STORE_TIMEOUT_MS"))? {
            cfg.coordinator.store_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>("JOBS_DISPATCH_TIMEOUT_MS", var("JOBS_DISPATCH_TIMEOUT_MS"))? {
            cfg.coordinator.dispatch_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>("JOBS_DISPATCH_MAX_ATTEMPTS", var("JOBS_DISPATCH_MAX_ATTEMPTS"))? {
            if attempts == 0 {
                return Err(InitError::Config(
                    "JOBS_DISPATCH_MAX_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            let policy = &cfg.coordinator.retry_policy;
            cfg.coordinator.retry_policy =
                RetryPolicy::new(policy.base_delay, policy.max_delay, attempts);
        }
        if let Some(ms) = parse_var::<u64>("JOBS_RECONCILE_INTERVAL_MS", var("JOBS_RECONCILE_INTERVAL_MS"))? {
            if ms == 0 {
                return Err(InitError::Config(
                    "JOBS_RECONCILE_INTERVAL_MS must be positive".to_string(),
                ));
            }
            cfg.coordinator.reconcile_interval = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

/// Running service handle.
pub struct JobQueue {
    pub coordinator: AppCoordinator,
    pub jobs: JobsApi<SurrealJobStore, BusPublisher>,
    pub completion: CompletionReceiver<SurrealJobStore, BusPublisher>,
    /// Dispatch bus; workers take partition consumers from here.
    pub bus: Arc<MessageBus>,
    pub reconciler: ActorRef<ReconcilerMessage>,
    reconciler_handle: tokio::task::JoinHandle<()>,
}

impl JobQueue {
    /// Stop the reconciler and close the bus.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down job queue system...");

        if let Err(e) = self.reconciler.send_message(ReconcilerMessage::Shutdown) {
            tracing::warn!("Failed to stop reconciler: {}", e);
        }
        if let Err(e) = self.reconciler_handle.await {
            tracing::warn!("Reconciler task ended abnormally: {}", e);
        }
        self.bus.close();

        tracing::info!("Job queue system stopped");
    }
}

/// Initialize the job lifecycle service.
///
/// Connects the database, prepares the schema, creates the dispatch bus,
/// and starts the reconciler.
pub async fn init_job_queue(config: AppConfig) -> Result<JobQueue, InitError> {
    tracing::info!("Initializing job queue system...");

    let store = SurrealJobStore::connect(&config.db).await?;
    tracing::info!(endpoint = %config.db.endpoint, "Connected job store");

    let bus = Arc::new(MessageBus::new(config.bus)?);
    tracing::info!(
        topic = %bus.topic(),
        partitions = bus.partition_count(),
        "Dispatch bus ready"
    );

    tracing::info!(retry_policy = %config.coordinator.retry_policy, "Starting coordinator");
    let coordinator = Coordinator::new(store, BusPublisher::new(bus.clone()), config.coordinator);

    let (reconciler, reconciler_handle) = start_reconciler(coordinator.clone())
        .await
        .map_err(|e| InitError::Spawn(e.to_string()))?;

    tracing::info!("Job queue system initialized");
    Ok(JobQueue {
        jobs: JobsApi::new(coordinator.clone()),
        completion: CompletionReceiver::new(coordinator.clone()),
        coordinator,
        bus,
        reconciler,
        reconciler_handle,
    })
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>, InitError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| InitError::Config(format!("{name}={raw} is not a valid number"))),
        None => Ok(None),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() -> Result<(), InitError> {
        let cfg = AppConfig::from_lookup(lookup(&[]))?;
        assert_eq!(cfg.db.endpoint, "mem://");
        assert_eq!(cfg.bus, BusConfig::default());
        assert_eq!(cfg.coordinator, CoordinatorConfig::default());
        Ok(())
    }

    #[test]
    fn variables_override_defaults() -> Result<(), InitError> {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("JOBS_DB_ENDPOINT", "rocksdb://./data/jobs"),
            ("JOBS_DB_NAMESPACE", "prod"),
            ("JOBS_BUS_TOPIC", "job-execution"),
            ("JOBS_BUS_PARTITIONS", "12"),
            ("JOBS_DISPATCH_TIMEOUT_MS", "250"),
            ("JOBS_STORE_TIMEOUT_MS", "750"),
            ("JOBS_DISPATCH_MAX_ATTEMPTS", "7"),
            ("JOBS_RECONCILE_INTERVAL_MS", "2000"),
        ]))?;

        assert_eq!(cfg.db.endpoint, "rocksdb://./data/jobs");
        assert_eq!(cfg.db.namespace, "prod");
        assert_eq!(cfg.bus.topic, "job-execution");
        assert_eq!(cfg.bus.partitions, 12);
        assert_eq!(cfg.coordinator.dispatch_timeout, Duration::from_millis(250));
        assert_eq!(cfg.coordinator.store_timeout, Duration::from_millis(750));
        assert_eq!(cfg.coordinator.retry_policy.max_attempts, 7);
        assert_eq!(cfg.coordinator.reconcile_interval, Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn bad_values_are_config_errors() {
        for vars in [
            &[("JOBS_BUS_PARTITIONS", "many")][..],
            &[("JOBS_BUS_PARTITIONS", "0")][..],
            &[("JOBS_DISPATCH_TIMEOUT_MS", "-5")][..],
            &[("JOBS_DISPATCH_MAX_ATTEMPTS", "0")][..],
            &[("JOBS_DB_USERNAME", "root")][..],
        ] {
            assert!(matches!(
                AppConfig::from_lookup(lookup(vars)),
                Err(InitError::Config(_))
            ));
        }
    }
}

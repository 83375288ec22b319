//! Per-key async locks serializing mutations of a single job.

use std::collections::HashMap;
use std::sync::Arc;

use queue_core::JobId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map size above which idle entries are pruned on the next acquisition.
const PRUNE_THRESHOLD: usize = 1024;

/// Lazily created mutex per job id.
///
/// Holders of different ids never contend; holders of the same id are
/// served in FIFO order.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: JobId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // Entries only referenced by the map have no holder or waiter.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(id).or_default().clone()
        };
        entry.lock_owned().await
    }

    /// Number of ids currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }
}

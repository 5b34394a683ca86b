//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of the
//! memory tier, so memory is reclaimed even for keys nobody reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a task that calls [`CacheStore::cleanup_expired`] every
/// `cleanup_interval_secs` seconds.
///
/// Returns the task handle; abort it during shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::in_memory(1024, EvictionStrategy::Lru, 300)?);
/// let cleanup_handle = spawn_cleanup_task(store.clone(), 30);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(store: Arc<CacheStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.cleanup_expired();
            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

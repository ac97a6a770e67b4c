//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries and
//! rate-limit windows. Reads already ignore expired state, so the sweep only
//! bounds memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedCache;
use crate::limiter::RateLimiter;

/// Spawns a background task that periodically sweeps expired state.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between runs. It holds the cache write lock only for the sweep itself.
///
/// # Arguments
/// * `cache` - Shared response cache
/// * `limiter` - Rate limiter whose stale windows are dropped
/// * `cleanup_interval_secs` - Interval in seconds between runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(gateway.cache().clone(), gateway.limiter().clone(), 300);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(
    cache: SharedCache,
    limiter: Arc<RateLimiter>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.write().await.cleanup_expired();
            let windows = limiter.purge_expired();

            if removed > 0 || windows > 0 {
                info!(
                    "Expiry sweep: removed {} cache entries and {} rate-limit windows",
                    removed, windows
                );
            } else {
                debug!("Expiry sweep: nothing expired");
            }
        }
    })
}

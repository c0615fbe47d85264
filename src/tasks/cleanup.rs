//! Cache Prune Task
//!
//! Background task that periodically removes expired response cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::SharedCache;

/// Spawns a background task that prunes expired cache entries every
/// `cleanup_interval_secs` seconds.
///
/// The returned handle is aborted during graceful shutdown. An interval of
/// zero is treated as one second.
///
/// # Example
/// ```ignore
/// let cache = shared_cache(&config.cache);
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: SharedCache, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting cache prune task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.lock().prune();

            if removed > 0 {
                info!(removed, "Cache prune removed expired entries");
            } else {
                debug!("Cache prune found no expired entries");
            }
        }
    })
}

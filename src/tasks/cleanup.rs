//! TTL Sweep Task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryCache;

/// Spawns a task that sweeps expired entries out of `cache` every
/// `cleanup_interval_secs` seconds.
///
/// Reads already treat expired entries as misses; the sweep only bounds the
/// memory held by keys nobody asks for again. Abort the returned handle on
/// shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(MemoryCache::new(10_000));
/// let sweep = spawn_cleanup_task(cache.clone(), 30);
/// // during shutdown
/// sweep.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<MemoryCache>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting cache TTL sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired().await;
            if removed > 0 {
                info!("TTL sweep: removed {} expired cache entries", removed);
            } else {
                debug!("TTL sweep: nothing expired");
            }
        }
    })
}

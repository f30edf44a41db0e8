//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries and
//! elapsed rate-limit windows, so memory stays bounded under low traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::pipeline::RateLimiters;

/// Spawns a background task that periodically sweeps expired state.
///
/// The task sleeps for the given interval between runs and only holds the
/// cache write lock for the purge itself.
///
/// # Arguments
/// * `cache` - Shared cache store
/// * `limiters` - Shared rate limiters
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
pub fn spawn_cleanup_task(
    cache: Arc<RwLock<CacheStore>>,
    limiters: Arc<RateLimiters>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.cleanup_expired()
            };
            let windows = limiters.purge_stale();

            if removed > 0 || windows > 0 {
                info!(
                    "Expiry sweep: removed {} cache entries, {} rate-limit windows",
                    removed, windows
                );
            } else {
                debug!("Expiry sweep: nothing to remove");
            }
        }
    })
}

//! Background cleanup: prune stale documents and idle rate-limit buckets.

use crate::error::RelayError;
use crate::rate_limit::RateLimiter;
use crate::storage::RelayStorage;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

pub fn spawn_cleanup_task(
    storage: RelayStorage,
    limiter: RateLimiter,
    retention_secs: u64,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            match run_cleanup(&storage, retention_secs, chrono::Utc::now().timestamp()) {
                Ok(0) => {}
                Ok(pruned) => tracing::info!("Pruned {} stale documents", pruned),
                Err(e) => tracing::error!("Cleanup error: {}", e),
            }
            let idle = limiter.prune_idle(Duration::from_secs(60));
            tracing::debug!("Cleanup completed, dropped {} idle rate buckets", idle);
        }
    })
}

fn run_cleanup(storage: &RelayStorage, retention_secs: u64, now: i64) -> Result<usize, RelayError> {
    let cutoff = now - retention_secs as i64;
    storage.prune_older_than(cutoff)
}

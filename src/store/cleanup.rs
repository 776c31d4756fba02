//! Periodic expiry of stored screenshots

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::ScreenshotStore;

/// Default sweep period and record lifetime (24 hours)
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Delete records older than `ttl` as seen from `now`
pub async fn sweep_expired(store: &ScreenshotStore, now: DateTime<Utc>, ttl: Duration) -> usize {
    let ttl = match chrono::Duration::from_std(ttl) {
        Ok(ttl) => ttl,
        Err(e) => {
            warn!("Screenshot TTL out of range, skipping sweep: {}", e);
            return 0;
        }
    };
    let Some(cutoff) = now.checked_sub_signed(ttl) else {
        return 0;
    };
    store.delete_older_than(cutoff).await
}

/// Spawn the background sweep
///
/// The first sweep runs one full `period` after start. The task ends when
/// the shutdown signal fires.
pub fn spawn_cleanup(
    store: Arc<ScreenshotStore>,
    period: Duration,
    ttl: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sweep_expired(&store, Utc::now(), ttl).await;
                    if removed > 0 {
                        info!(
                            "Expired {} stored screenshot(s), {} remaining",
                            removed,
                            store.len().await
                        );
                    } else {
                        debug!("Cleanup sweep found nothing to expire");
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Cleanup task stopping");
                    break;
                }
            }
        }
    })
}

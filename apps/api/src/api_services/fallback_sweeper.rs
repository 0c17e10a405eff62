use std::time::Duration;

use chrono::Utc;
use moodcap_infrastructure::FallbackStores;
use tracing::{info, warn};

/// Periodically drops expired state from the process-local fallback stores.
/// The worker's maintenance pass only reaches the durable store.
pub fn spawn_fallback_sweeper(stores: FallbackStores, interval: Duration) {
    tokio::spawn(async move {
        info!(
            interval_seconds = interval.as_secs(),
            "fallback sweeper started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match stores.sweep(Utc::now()).await {
                Ok(sweep) if sweep.total() > 0 => info!(
                    cache_entries = sweep.cache_entries,
                    quota_windows = sweep.quota_windows,
                    block_records = sweep.block_records,
                    "fallback sweep removed expired state"
                ),
                Ok(_) => {}
                Err(error) => warn!(error = %error, "fallback sweep failed"),
            }
        }
    });
}

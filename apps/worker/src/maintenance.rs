use std::future::Future;

use moodcap_application::{AbuseBlockService, QuotaService, ResultCacheService};
use moodcap_core::AppResult;
use tracing::{info, warn};

/// Services swept by one maintenance pass.
#[derive(Clone)]
pub struct MaintenanceServices {
    pub result_cache: ResultCacheService,
    pub quota: QuotaService,
    pub blocks: AbuseBlockService,
}

/// Records removed by one pass. Failed steps count zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_cache_entries: u64,
    pub stale_cache_entries: u64,
    pub expired_quota_windows: u64,
    pub lapsed_blocks: u64,
    pub failed_steps: u32,
}

/// Runs every durable sweep once. A failing step is logged and the pass
/// continues with the next one.
pub async fn run_maintenance_pass(
    services: &MaintenanceServices,
    cache_cleanup_days: i64,
) -> MaintenanceReport {
    let mut failed_steps = 0_u32;

    let expired_cache_entries = step(
        &mut failed_steps,
        "purge_expired_cache_entries",
        services.result_cache.purge_expired(),
    )
    .await;
    let stale_cache_entries = step(
        &mut failed_steps,
        "clean_stale_cache_entries",
        services.result_cache.clean_older_than(cache_cleanup_days),
    )
    .await;
    let expired_quota_windows = step(
        &mut failed_steps,
        "cleanup_expired_quota_windows",
        services.quota.cleanup_expired(),
    )
    .await;
    let lapsed_blocks = step(
        &mut failed_steps,
        "purge_lapsed_blocks",
        services.blocks.purge_expired(),
    )
    .await;

    let report = MaintenanceReport {
        expired_cache_entries,
        stale_cache_entries,
        expired_quota_windows,
        lapsed_blocks,
        failed_steps,
    };

    info!(
        expired_cache_entries = report.expired_cache_entries,
        stale_cache_entries = report.stale_cache_entries,
        expired_quota_windows = report.expired_quota_windows,
        lapsed_blocks = report.lapsed_blocks,
        failed_steps = report.failed_steps,
        "maintenance pass finished"
    );

    report
}

async fn step(
    failed_steps: &mut u32,
    operation: &'static str,
    sweep: impl Future<Output = AppResult<u64>>,
) -> u64 {
    match sweep.await {
        Ok(removed) => removed,
        Err(error) => {
            *failed_steps = failed_steps.saturating_add(1);
            warn!(operation, error = %error, "maintenance step failed");
            0
        }
    }
}

#[cfg(test)]
mod tests;

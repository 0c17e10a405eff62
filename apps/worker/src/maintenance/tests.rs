use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use moodcap_application::{
    AbuseBlockService, FingerprintService, ManualClock, QuotaConsumption, QuotaPolicy,
    QuotaService, QuotaWindowRepository, ResultCacheService,
};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{BlockEscalation, CacheKey, IdentityKey, ImageSource, QuotaWindow};
use moodcap_infrastructure::{
    InMemoryBlockRecordRepository, InMemoryQuotaWindowRepository, InMemoryResultCacheRepository,
};

use super::{MaintenanceReport, MaintenanceServices, run_maintenance_pass};

struct DownQuotaStore;

#[async_trait]
impl QuotaWindowRepository for DownQuotaStore {
    async fn consume(
        &self,
        _key: &str,
        _max_generations: i64,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        Err(AppError::Unavailable("connection refused".to_owned()))
    }

    async fn find(&self, _key: &str) -> AppResult<Option<QuotaWindow>> {
        Err(AppError::Unavailable("connection refused".to_owned()))
    }

    async fn reset_all(&self) -> AppResult<u64> {
        Err(AppError::Unavailable("connection refused".to_owned()))
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> AppResult<u64> {
        Err(AppError::Unavailable("connection refused".to_owned()))
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn key(image: &[u8]) -> CacheKey {
    let Ok(fingerprint) = FingerprintService::new().fingerprint(&ImageSource::Bytes(image.to_vec()))
    else {
        panic!("fixture image should fingerprint");
    };
    let Ok(key) = CacheKey::new(fingerprint, None, "calm") else {
        panic!("fixture key should be valid");
    };
    key
}

fn services(
    clock: Arc<ManualClock>,
    cache: Arc<InMemoryResultCacheRepository>,
    quota: Arc<dyn QuotaWindowRepository>,
) -> MaintenanceServices {
    MaintenanceServices {
        result_cache: ResultCacheService::new(cache).with_clock(clock.clone()),
        quota: QuotaService::new(quota, QuotaPolicy::default()).with_clock(clock.clone()),
        blocks: AbuseBlockService::new(
            Arc::new(InMemoryBlockRecordRepository::new()),
            BlockEscalation::default(),
        )
        .with_clock(clock),
    }
}

#[tokio::test]
async fn one_pass_sweeps_every_durable_collection() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let cache = Arc::new(InMemoryResultCacheRepository::new());
    let quota = Arc::new(InMemoryQuotaWindowRepository::new());
    let services = services(clock.clone(), cache.clone(), quota);

    let _ = services
        .result_cache
        .store(key(b"old-once"), vec!["a".to_owned()], None)
        .await;
    let popular = key(b"old-popular");
    let _ = services
        .result_cache
        .store(popular.clone(), vec!["b".to_owned()], None)
        .await;
    for _ in 0..3 {
        let _ = services.result_cache.lookup(&popular).await;
    }
    let Ok(visitor) = IdentityKey::ip("198.51.100.20") else {
        panic!("fixture identity should be valid");
    };
    let _ = services.quota.check_identity(&visitor).await;
    let _ = services
        .blocks
        .block("spam@example.com", "spam", None, None)
        .await;

    clock.advance(Duration::days(40));
    let short_lived = services
        .result_cache
        .clone()
        .with_entry_ttl(Some(Duration::days(1)));
    let _ = short_lived
        .store(key(b"short"), vec!["c".to_owned()], None)
        .await;
    let _ = services
        .result_cache
        .store(key(b"fresh"), vec!["d".to_owned()], None)
        .await;
    clock.advance(Duration::days(2));

    let report = run_maintenance_pass(&services, 30).await;
    assert_eq!(
        report,
        MaintenanceReport {
            expired_cache_entries: 1,
            stale_cache_entries: 1,
            expired_quota_windows: 1,
            lapsed_blocks: 1,
            failed_steps: 0,
        }
    );
    assert_eq!(cache.len().await, 2);
    assert!(services.result_cache.lookup(&popular).await.is_hit());
}

#[tokio::test]
async fn a_failing_step_does_not_stop_the_pass() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let cache = Arc::new(InMemoryResultCacheRepository::new());
    let services = services(clock.clone(), cache, Arc::new(DownQuotaStore));
    let _ = services
        .blocks
        .block("spam@example.com", "spam", None, None)
        .await;
    clock.advance(Duration::days(2));

    let report = run_maintenance_pass(&services, 30).await;
    assert_eq!(report.failed_steps, 1);
    assert_eq!(report.lapsed_blocks, 1);
}

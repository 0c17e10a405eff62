//! Durable-store failover.
//!
//! Each `Failover*Repository` forwards to the durable adapter under a
//! timeout. Connectivity failures and timeouts mark that collection's
//! [`StoreHealth`] degraded and the call is served by the process-local
//! in-memory adapter instead. While degraded, the durable store is skipped
//! until the retry window passes, then tried again.
//!
//! Each collection carries its own signal, so an outage of one store never
//! moves another collection onto its fallback.
//!
//! Fallback state is private to this process. During an outage every
//! instance enforces quota and blocks on its own view only. Captions cached
//! by the fallback expire after [`FALLBACK_CACHE_TTL_MINUTES`].

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use moodcap_application::{
    BlockRecordRepository, CacheAggregate, CacheEntryUpsert, CacheSearchCriteria,
    QuotaConsumption, QuotaWindowRepository, ResultCacheRepository,
};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{
    BlockEscalation, BlockOffense, BlockRecord, CacheEntry, CacheKey, Credential, QuotaWindow,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    InMemoryBlockRecordRepository, InMemoryQuotaWindowRepository, InMemoryResultCacheRepository,
};

/// Upper bound on the lifetime of a caption cached by the fallback.
pub const FALLBACK_CACHE_TTL_MINUTES: i64 = 60;

/// Point-in-time view of the durable store health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealthSnapshot {
    /// Whether requests are currently served by process-local fallbacks.
    pub degraded: bool,
    /// When the current degraded period started.
    pub degraded_since: Option<DateTime<Utc>>,
    /// Most recent durable store failure.
    pub last_error: Option<String>,
    /// When the most recent durable store failure happened.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Calls served by a fallback since startup.
    pub failovers: u64,
}

impl StoreHealthSnapshot {
    /// Folds several collection snapshots into one view.
    ///
    /// Degraded when any collection is. The earliest degraded start and the
    /// most recent failure win; failover counts add up.
    #[must_use]
    pub fn combine<'a>(snapshots: impl IntoIterator<Item = &'a StoreHealthSnapshot>) -> Self {
        let mut combined = Self {
            degraded: false,
            degraded_since: None,
            last_error: None,
            last_failure_at: None,
            failovers: 0,
        };
        for snapshot in snapshots {
            combined.degraded |= snapshot.degraded;
            combined.degraded_since = match (combined.degraded_since, snapshot.degraded_since) {
                (Some(current), Some(other)) => Some(current.min(other)),
                (current, other) => current.or(other),
            };
            if snapshot.last_failure_at > combined.last_failure_at {
                combined.last_failure_at = snapshot.last_failure_at;
                combined.last_error.clone_from(&snapshot.last_error);
            }
            combined.failovers = combined.failovers.saturating_add(snapshot.failovers);
        }
        combined
    }
}

#[derive(Debug, Default)]
struct HealthState {
    degraded_since: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_failure_at: Option<DateTime<Utc>>,
    failovers: u64,
    retry_at: Option<Instant>,
}

/// Shared degraded-mode signal for one durable store.
#[derive(Debug)]
pub struct StoreHealth {
    retry_after: Duration,
    state: Mutex<HealthState>,
}

impl StoreHealth {
    /// Creates a healthy signal. While degraded, the durable store is
    /// skipped for `retry_after` after each failure.
    #[must_use]
    pub fn new(retry_after: Duration) -> Self {
        Self {
            retry_after,
            state: Mutex::new(HealthState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HealthState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns whether fallbacks are serving requests.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state().degraded_since.is_some()
    }

    /// Returns the current health view.
    #[must_use]
    pub fn snapshot(&self) -> StoreHealthSnapshot {
        let state = self.state();
        StoreHealthSnapshot {
            degraded: state.degraded_since.is_some(),
            degraded_since: state.degraded_since,
            last_error: state.last_error.clone(),
            last_failure_at: state.last_failure_at,
            failovers: state.failovers,
        }
    }

    fn should_skip_primary(&self) -> bool {
        self.state()
            .retry_at
            .is_some_and(|retry_at| Instant::now() < retry_at)
    }

    fn record_success(&self, component: &str) {
        let mut state = self.state();
        if let Some(since) = state.degraded_since.take() {
            state.retry_at = None;
            info!(
                component,
                degraded_since = %since,
                "durable store recovered, leaving degraded mode"
            );
        }
    }

    fn record_failover(&self, component: &str, operation: &str, error: &AppError) {
        let now = Utc::now();
        let mut state = self.state();
        state.failovers = state.failovers.saturating_add(1);
        state.last_error = Some(error.to_string());
        state.last_failure_at = Some(now);
        state.retry_at = Instant::now().checked_add(self.retry_after);

        if state.degraded_since.is_none() {
            state.degraded_since = Some(now);
            warn!(
                component,
                operation,
                error = %error,
                "durable store unavailable, serving from process-local fallback"
            );
        }
    }
}

/// One [`StoreHealth`] per durable collection.
#[derive(Debug, Clone)]
pub struct StoreHealthSet {
    /// Caption cache collection.
    pub cache: Arc<StoreHealth>,
    /// Quota windows, in Postgres or Redis.
    pub quota: Arc<StoreHealth>,
    /// Block records.
    pub blocks: Arc<StoreHealth>,
}

impl StoreHealthSet {
    /// Creates healthy signals sharing one retry window length.
    #[must_use]
    pub fn new(retry_after: Duration) -> Self {
        Self {
            cache: Arc::new(StoreHealth::new(retry_after)),
            quota: Arc::new(StoreHealth::new(retry_after)),
            blocks: Arc::new(StoreHealth::new(retry_after)),
        }
    }

    /// Returns whether any collection is served by its fallback.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.cache.is_degraded() || self.quota.is_degraded() || self.blocks.is_degraded()
    }

    /// Returns the per-collection views, in cache, quota, blocks order.
    #[must_use]
    pub fn snapshots(&self) -> [StoreHealthSnapshot; 3] {
        [
            self.cache.snapshot(),
            self.quota.snapshot(),
            self.blocks.snapshot(),
        ]
    }
}

#[derive(Clone)]
struct Failover {
    component: &'static str,
    health: Arc<StoreHealth>,
    timeout: Duration,
}

impl Failover {
    async fn call<T, P, F>(&self, operation: &'static str, primary: P, fallback: F) -> AppResult<T>
    where
        P: Future<Output = AppResult<T>>,
        F: Future<Output = AppResult<T>>,
    {
        if self.health.should_skip_primary() {
            return fallback.await;
        }

        let error = match tokio::time::timeout(self.timeout, primary).await {
            Ok(Ok(value)) => {
                self.health.record_success(self.component);
                return Ok(value);
            }
            Ok(Err(error)) if error.is_validation() => return Err(error),
            Ok(Err(error)) => error,
            Err(_) => AppError::Unavailable(format!(
                "{operation} timed out after {} ms",
                self.timeout.as_millis()
            )),
        };

        self.health
            .record_failover(self.component, operation, &error);
        fallback.await
    }
}

/// Caption cache that fails over to [`InMemoryResultCacheRepository`].
#[derive(Clone)]
pub struct FailoverResultCacheRepository {
    primary: Arc<dyn ResultCacheRepository>,
    fallback: Arc<InMemoryResultCacheRepository>,
    failover: Failover,
}

impl FailoverResultCacheRepository {
    /// Wraps a durable cache repository.
    #[must_use]
    pub fn new(
        primary: Arc<dyn ResultCacheRepository>,
        fallback: Arc<InMemoryResultCacheRepository>,
        health: Arc<StoreHealth>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            failover: Failover {
                component: "result_cache",
                health,
                timeout,
            },
        }
    }
}

#[async_trait]
impl ResultCacheRepository for FailoverResultCacheRepository {
    async fn find_and_touch(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<CacheEntry>> {
        self.failover
            .call(
                "find_and_touch",
                self.primary.find_and_touch(key, now),
                self.fallback.find_and_touch(key, now),
            )
            .await
    }

    async fn upsert(&self, input: CacheEntryUpsert, now: DateTime<Utc>) -> AppResult<CacheEntry> {
        let fallback_input = CacheEntryUpsert {
            expires_at: Some(fallback_expiry(input.expires_at, now)),
            ..input.clone()
        };
        self.failover
            .call(
                "upsert",
                self.primary.upsert(input, now),
                self.fallback.upsert(fallback_input, now),
            )
            .await
    }

    async fn aggregate(&self) -> AppResult<CacheAggregate> {
        self.failover
            .call(
                "aggregate",
                self.primary.aggregate(),
                self.fallback.aggregate(),
            )
            .await
    }

    async fn search(
        &self,
        criteria: &CacheSearchCriteria,
        limit: usize,
    ) -> AppResult<Vec<CacheEntry>> {
        self.failover
            .call(
                "search",
                self.primary.search(criteria, limit),
                self.fallback.search(criteria, limit),
            )
            .await
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool> {
        self.failover
            .call(
                "delete_by_id",
                self.primary.delete_by_id(id),
                self.fallback.delete_by_id(id),
            )
            .await
    }

    async fn delete_stale(
        &self,
        created_before: DateTime<Utc>,
        min_usage_to_keep: i64,
    ) -> AppResult<u64> {
        self.failover
            .call(
                "delete_stale",
                self.primary.delete_stale(created_before, min_usage_to_keep),
                self.fallback.delete_stale(created_before, min_usage_to_keep),
            )
            .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.failover
            .call(
                "delete_expired",
                self.primary.delete_expired(now),
                self.fallback.delete_expired(now),
            )
            .await
    }
}

/// Fallback captions never outlive the durable expiry nor the fallback TTL.
fn fallback_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let bound = TimeDelta::try_minutes(FALLBACK_CACHE_TTL_MINUTES)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now);
    expires_at.map_or(bound, |expires_at| expires_at.min(bound))
}

/// Quota windows that fail over to [`InMemoryQuotaWindowRepository`].
#[derive(Clone)]
pub struct FailoverQuotaWindowRepository {
    primary: Arc<dyn QuotaWindowRepository>,
    fallback: Arc<InMemoryQuotaWindowRepository>,
    failover: Failover,
}

impl FailoverQuotaWindowRepository {
    /// Wraps a durable quota repository.
    #[must_use]
    pub fn new(
        primary: Arc<dyn QuotaWindowRepository>,
        fallback: Arc<InMemoryQuotaWindowRepository>,
        health: Arc<StoreHealth>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            failover: Failover {
                component: "quota",
                health,
                timeout,
            },
        }
    }
}

#[async_trait]
impl QuotaWindowRepository for FailoverQuotaWindowRepository {
    async fn consume(
        &self,
        key: &str,
        max_generations: i64,
        window: chrono::Duration,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        self.failover
            .call(
                "consume",
                self.primary.consume(key, max_generations, window, now),
                self.fallback.consume(key, max_generations, window, now),
            )
            .await
    }

    async fn find(&self, key: &str) -> AppResult<Option<QuotaWindow>> {
        self.failover
            .call("find", self.primary.find(key), self.fallback.find(key))
            .await
    }

    async fn reset_all(&self) -> AppResult<u64> {
        self.failover
            .call(
                "reset_all",
                self.primary.reset_all(),
                self.fallback.reset_all(),
            )
            .await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.failover
            .call(
                "cleanup_expired",
                self.primary.cleanup_expired(now),
                self.fallback.cleanup_expired(now),
            )
            .await
    }
}

/// Block list that fails over to [`InMemoryBlockRecordRepository`].
#[derive(Clone)]
pub struct FailoverBlockRecordRepository {
    primary: Arc<dyn BlockRecordRepository>,
    fallback: Arc<InMemoryBlockRecordRepository>,
    failover: Failover,
}

impl FailoverBlockRecordRepository {
    /// Wraps a durable block repository.
    #[must_use]
    pub fn new(
        primary: Arc<dyn BlockRecordRepository>,
        fallback: Arc<InMemoryBlockRecordRepository>,
        health: Arc<StoreHealth>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            failover: Failover {
                component: "abuse_block",
                health,
                timeout,
            },
        }
    }
}

#[async_trait]
impl BlockRecordRepository for FailoverBlockRecordRepository {
    async fn record_offense(
        &self,
        offense: &BlockOffense,
        escalation: BlockEscalation,
        now: DateTime<Utc>,
    ) -> AppResult<BlockRecord> {
        self.failover
            .call(
                "record_offense",
                self.primary.record_offense(offense, escalation, now),
                self.fallback.record_offense(offense, escalation, now),
            )
            .await
    }

    async fn find(&self, credential: &Credential) -> AppResult<Option<BlockRecord>> {
        self.failover
            .call(
                "find",
                self.primary.find(credential),
                self.fallback.find(credential),
            )
            .await
    }

    async fn delete_if_lapsed(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.failover
            .call(
                "delete_if_lapsed",
                self.primary.delete_if_lapsed(credential, now),
                self.fallback.delete_if_lapsed(credential, now),
            )
            .await
    }

    async fn delete(&self, credential: &Credential) -> AppResult<bool> {
        self.failover
            .call(
                "delete",
                self.primary.delete(credential),
                self.fallback.delete(credential),
            )
            .await
    }

    async fn delete_lapsed(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.failover
            .call(
                "delete_lapsed",
                self.primary.delete_lapsed(now),
                self.fallback.delete_lapsed(now),
            )
            .await
    }

    async fn delete_all(&self) -> AppResult<u64> {
        self.failover
            .call(
                "delete_all",
                self.primary.delete_all(),
                self.fallback.delete_all(),
            )
            .await
    }
}

/// Entries removed by one fallback sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackSweep {
    /// Expired cache entries.
    pub cache_entries: u64,
    /// Rolled-over quota windows.
    pub quota_windows: u64,
    /// Lapsed blocks.
    pub block_records: u64,
}

impl FallbackSweep {
    /// Total records removed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.cache_entries + self.quota_windows + self.block_records
    }
}

/// The process-local fallback adapters, shared with the failover wrappers.
#[derive(Debug, Clone, Default)]
pub struct FallbackStores {
    /// Fallback caption cache.
    pub cache: Arc<InMemoryResultCacheRepository>,
    /// Fallback quota windows.
    pub quota: Arc<InMemoryQuotaWindowRepository>,
    /// Fallback block list.
    pub blocks: Arc<InMemoryBlockRecordRepository>,
}

impl FallbackStores {
    /// Creates empty fallback adapters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired state from every fallback adapter.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<FallbackSweep> {
        Ok(FallbackSweep {
            cache_entries: self.cache.delete_expired(now).await?,
            quota_windows: self.quota.cleanup_expired(now).await?,
            block_records: self.blocks.delete_lapsed(now).await?,
        })
    }
}

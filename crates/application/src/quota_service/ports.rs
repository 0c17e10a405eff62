use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moodcap_core::AppResult;
use moodcap_domain::QuotaWindow;

/// Repository port for the `quota_windows` collection.
#[async_trait]
pub trait QuotaWindowRepository: Send + Sync {
    /// Counts one request against `key` as a single atomic step.
    ///
    /// - No window, or a window with `reset_at <= now`: start a fresh window
    ///   with `count = 1`, `reset_at = now + window`; allowed.
    /// - `count >= max_generations`: leave the record untouched; denied.
    /// - Otherwise increment `count`; allowed.
    ///
    /// Implementations must not read the counter and write back `count + 1`
    /// in separate steps.
    async fn consume(
        &self,
        key: &str,
        max_generations: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption>;

    /// Returns the stored window for `key`, live or not.
    async fn find(&self, key: &str) -> AppResult<Option<QuotaWindow>>;

    /// Deletes every window.
    async fn reset_all(&self) -> AppResult<u64>;

    /// Deletes windows that rolled over at or before `now`.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Result of one [`QuotaWindowRepository::consume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConsumption {
    /// Counter value after the call.
    pub count: i64,
    /// When the current window rolls over.
    pub window_reset_at: DateTime<Utc>,
    /// Whether this request was counted.
    pub allowed: bool,
}

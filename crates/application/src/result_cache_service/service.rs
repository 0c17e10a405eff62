use std::sync::Arc;

use chrono::Duration;
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{CacheEntry, CacheKey};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::{Clock, system_clock};

use super::ports::{CacheEntryUpsert, CacheSearchCriteria, ResultCacheRepository};

/// Maximum number of entries returned by one search.
pub const CACHE_SEARCH_PAGE_SIZE: usize = 100;

/// Entries reused at least this often survive age-based cleanup.
pub const CLEANUP_PROTECTED_USAGE: i64 = 2;

/// Outcome of a cache lookup. Absence is a normal value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Stored captions were found; the hit has been counted.
    Hit(CacheEntry),
    /// Nothing stored for the key, or the store could not be consulted.
    Miss,
}

impl CacheLookup {
    /// Returns whether the lookup found an entry.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Returns cached captions on a hit.
    #[must_use]
    pub fn captions(&self) -> Option<&[String]> {
        match self {
            Self::Hit(entry) => Some(entry.captions.as_slice()),
            Self::Miss => None,
        }
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of stored entries.
    pub entries: i64,
    /// Sum of all usage counts.
    pub total_usage: i64,
    /// Mean usage per entry, zero for an empty cache.
    pub average_usage: f64,
    /// Oldest entry creation time.
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
    /// Newest entry creation time.
    pub newest: Option<chrono::DateTime<chrono::Utc>>,
    /// Generation calls avoided: every use beyond an entry's creation.
    pub quota_saved: i64,
}

impl CacheStats {
    /// Share of uses that were served from cache, in percent.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.total_usage <= 0 {
            return 0.0;
        }

        self.quota_saved as f64 / self.total_usage as f64 * 100.0
    }
}

/// Application service over the caption result cache.
#[derive(Clone)]
pub struct ResultCacheService {
    repository: Arc<dyn ResultCacheRepository>,
    clock: Arc<dyn Clock>,
    entry_ttl: Option<Duration>,
}

impl ResultCacheService {
    /// Creates a cache service without entry expiry.
    #[must_use]
    pub fn new(repository: Arc<dyn ResultCacheRepository>) -> Self {
        Self {
            repository,
            clock: system_clock(),
            entry_ttl: None,
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the lifetime given to entries on every store.
    #[must_use]
    pub fn with_entry_ttl(mut self, entry_ttl: Option<Duration>) -> Self {
        self.entry_ttl = entry_ttl;
        self
    }

    /// Looks up cached captions and counts the hit.
    ///
    /// Store failures are logged and reported as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let now = self.clock.now();
        match self.repository.find_and_touch(key, now).await {
            Ok(Some(entry)) => {
                debug!(
                    fingerprint = %key.fingerprint(),
                    mood = key.mood(),
                    usage_count = entry.usage_count,
                    "caption cache hit"
                );
                CacheLookup::Hit(entry)
            }
            Ok(None) => CacheLookup::Miss,
            Err(error) => {
                warn!(
                    fingerprint = %key.fingerprint(),
                    mood = key.mood(),
                    error = %error,
                    "caption cache lookup failed, treating as miss"
                );
                CacheLookup::Miss
            }
        }
    }

    /// Stores captions for a key, replacing any existing captions.
    ///
    /// Safe to call unconditionally after a miss: concurrent stores for the
    /// same key each count one use and the last writer's captions win.
    pub async fn store(
        &self,
        key: CacheKey,
        captions: Vec<String>,
        owner_id: Option<String>,
    ) -> AppResult<CacheEntry> {
        if captions.is_empty() {
            return Err(AppError::Validation(
                "cannot cache an empty caption set".to_owned(),
            ));
        }

        let now = self.clock.now();
        let expires_at = match self.entry_ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                AppError::Validation("cache entry lifetime is out of range".to_owned())
            })?),
            None => None,
        };
        self.repository
            .upsert(
                CacheEntryUpsert {
                    key,
                    captions,
                    owner_id,
                    expires_at,
                },
                now,
            )
            .await
    }

    /// Returns aggregate statistics over all entries.
    pub async fn stats(&self) -> AppResult<CacheStats> {
        let aggregate = self.repository.aggregate().await?;
        let average_usage = if aggregate.entries > 0 {
            aggregate.total_usage as f64 / aggregate.entries as f64
        } else {
            0.0
        };

        Ok(CacheStats {
            entries: aggregate.entries,
            total_usage: aggregate.total_usage,
            average_usage,
            oldest: aggregate.oldest,
            newest: aggregate.newest,
            quota_saved: (aggregate.total_usage - aggregate.entries).max(0),
        })
    }

    /// Percentage of uses served from cache; zero when nothing was used.
    pub async fn hit_rate(&self) -> AppResult<f64> {
        Ok(self.stats().await?.hit_rate())
    }

    /// Searches entries, most recently used first, capped at
    /// [`CACHE_SEARCH_PAGE_SIZE`].
    pub async fn search(&self, criteria: &CacheSearchCriteria) -> AppResult<Vec<CacheEntry>> {
        if criteria.min_usage.is_some_and(|min_usage| min_usage < 0) {
            return Err(AppError::Validation(
                "min_usage must not be negative".to_owned(),
            ));
        }

        if let (Some(from), Some(to)) = (criteria.created_from, criteria.created_to)
            && from > to
        {
            return Err(AppError::Validation(
                "created_from must not be after created_to".to_owned(),
            ));
        }

        self.repository
            .search(criteria, CACHE_SEARCH_PAGE_SIZE)
            .await
    }

    /// Deletes one entry. Returns whether it existed.
    pub async fn delete_by_id(&self, id: Uuid) -> AppResult<bool> {
        self.repository.delete_by_id(id).await
    }

    /// Deletes entries older than `days` that were never reused.
    ///
    /// Entries with a usage count of [`CLEANUP_PROTECTED_USAGE`] or more are
    /// kept regardless of age.
    pub async fn clean_older_than(&self, days: i64) -> AppResult<u64> {
        if days < 0 {
            return Err(AppError::Validation(
                "cleanup age in days must not be negative".to_owned(),
            ));
        }

        let cutoff = Duration::try_days(days)
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .ok_or_else(|| {
                AppError::Validation(format!("cleanup age of {days} days is out of range"))
            })?;
        let removed = self
            .repository
            .delete_stale(cutoff, CLEANUP_PROTECTED_USAGE)
            .await?;
        debug!(days, removed, "cleaned stale caption cache entries");

        Ok(removed)
    }

    /// Deletes entries whose expiry has passed.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.repository.delete_expired(self.clock.now()).await
    }
}

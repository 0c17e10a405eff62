use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodcap_core::AppResult;
use moodcap_domain::{CacheEntry, CacheKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Repository port for the `cache_entries` collection.
///
/// Usage counters must be changed with the store's atomic increment or upsert
/// primitive, never by reading a value and writing back `count + 1`.
#[async_trait]
pub trait ResultCacheRepository: Send + Sync {
    /// Finds a live entry and records a hit on it.
    ///
    /// Atomically increments `usage_count` and sets `last_used_at = now`.
    /// Entries whose `expires_at` has been reached are treated as absent.
    async fn find_and_touch(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<CacheEntry>>;

    /// Inserts or replaces the entry for `input.key`.
    ///
    /// New entries start at `usage_count = 1`. Existing entries get the new
    /// captions, owner and expiry, `last_used_at = now` and one more use.
    async fn upsert(&self, input: CacheEntryUpsert, now: DateTime<Utc>) -> AppResult<CacheEntry>;

    /// Aggregates entry count, usage total and creation range.
    async fn aggregate(&self) -> AppResult<CacheAggregate>;

    /// Returns matching entries, most recently used first, at most `limit`.
    async fn search(
        &self,
        criteria: &CacheSearchCriteria,
        limit: usize,
    ) -> AppResult<Vec<CacheEntry>>;

    /// Deletes one entry by id. Returns whether a record was removed.
    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool>;

    /// Deletes entries created before `created_before` whose usage count is
    /// below `min_usage_to_keep`.
    async fn delete_stale(
        &self,
        created_before: DateTime<Utc>,
        min_usage_to_keep: i64,
    ) -> AppResult<u64>;

    /// Deletes entries whose expiry has been reached.
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Write model for [`ResultCacheRepository::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryUpsert {
    /// Entry key.
    pub key: CacheKey,
    /// Captions to store.
    pub captions: Vec<String>,
    /// Identity of the storing caller.
    pub owner_id: Option<String>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Raw aggregate over the cache collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheAggregate {
    /// Number of entries.
    pub entries: i64,
    /// Sum of usage counts.
    pub total_usage: i64,
    /// Oldest `created_at`.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest `created_at`.
    pub newest: Option<DateTime<Utc>>,
}

/// Administrative search filter. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSearchCriteria {
    /// Exact owner match.
    pub owner_id: Option<String>,
    /// Exact mood match (normalised before comparison).
    pub mood: Option<String>,
    /// Case-insensitive substring of the stored prompt.
    pub prompt_contains: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
    /// Minimum usage count.
    pub min_usage: Option<i64>,
}

impl CacheSearchCriteria {
    /// Returns whether an entry satisfies every set filter.
    ///
    /// Shared by adapters that filter in process.
    #[must_use]
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        let owner_matches = self
            .owner_id
            .as_deref()
            .is_none_or(|owner| entry.owner_id.as_deref() == Some(owner));
        let mood_matches = self
            .mood
            .as_deref()
            .is_none_or(|mood| entry.key.mood() == mood.trim().to_lowercase());
        let prompt_matches = self.prompt_contains.as_deref().is_none_or(|needle| {
            entry
                .key
                .prompt()
                .to_lowercase()
                .contains(needle.to_lowercase().as_str())
        });
        let from_matches = self
            .created_from
            .is_none_or(|from| entry.created_at >= from);
        let to_matches = self.created_to.is_none_or(|to| entry.created_at <= to);
        let usage_matches = self
            .min_usage
            .is_none_or(|min_usage| entry.usage_count >= min_usage);

        owner_matches
            && mood_matches
            && prompt_matches
            && from_matches
            && to_matches
            && usage_matches
    }
}

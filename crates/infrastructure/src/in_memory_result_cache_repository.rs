use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodcap_application::{
    CacheAggregate, CacheEntryUpsert, CacheSearchCriteria, ResultCacheRepository,
};
use moodcap_core::AppResult;
use moodcap_domain::{CacheEntry, CacheKey};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local caption cache.
///
/// Used as the fallback while the durable store is unreachable. State is
/// private to this process.
#[derive(Debug, Default)]
pub struct InMemoryResultCacheRepository {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryResultCacheRepository {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCacheRepository for InMemoryResultCacheRepository {
    async fn find_and_touch(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<CacheEntry>> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            entry.usage_count = entry.usage_count.saturating_add(1);
            entry.last_used_at = now;
            entry.clone()
        }))
    }

    async fn upsert(&self, input: CacheEntryUpsert, now: DateTime<Utc>) -> AppResult<CacheEntry> {
        let mut entries = self.entries.write().await;
        if entries
            .get(&input.key)
            .is_some_and(|entry| entry.is_expired(now))
        {
            entries.remove(&input.key);
        }

        let entry = match entries.get_mut(&input.key) {
            Some(existing) => {
                existing.captions = input.captions;
                existing.owner_id = input.owner_id;
                existing.expires_at = input.expires_at;
                existing.usage_count = existing.usage_count.saturating_add(1);
                existing.last_used_at = now;
                existing.clone()
            }
            None => {
                let created = CacheEntry {
                    id: Uuid::new_v4(),
                    key: input.key.clone(),
                    captions: input.captions,
                    owner_id: input.owner_id,
                    usage_count: 1,
                    created_at: now,
                    last_used_at: now,
                    expires_at: input.expires_at,
                };
                entries.insert(input.key, created.clone());
                created
            }
        };

        Ok(entry)
    }

    async fn aggregate(&self) -> AppResult<CacheAggregate> {
        let entries = self.entries.read().await;
        let aggregate = entries
            .values()
            .fold(CacheAggregate::default(), |mut aggregate, entry| {
                aggregate.entries += 1;
                aggregate.total_usage = aggregate.total_usage.saturating_add(entry.usage_count);
                aggregate.oldest = Some(
                    aggregate
                        .oldest
                        .map_or(entry.created_at, |oldest| oldest.min(entry.created_at)),
                );
                aggregate.newest = Some(
                    aggregate
                        .newest
                        .map_or(entry.created_at, |newest| newest.max(entry.created_at)),
                );
                aggregate
            });

        Ok(aggregate)
    }

    async fn search(
        &self,
        criteria: &CacheSearchCriteria,
        limit: usize,
    ) -> AppResult<Vec<CacheEntry>> {
        let entries = self.entries.read().await;
        let mut matches: Vec<CacheEntry> = entries
            .values()
            .filter(|entry| criteria.matches(entry))
            .cloned()
            .collect();
        matches.sort_by(|left, right| right.last_used_at.cmp(&left.last_used_at));
        matches.truncate(limit);

        Ok(matches)
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.id != id);
        Ok(entries.len() < before)
    }

    async fn delete_stale(
        &self,
        created_before: DateTime<Utc>,
        min_usage_to_keep: i64,
    ) -> AppResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.created_at >= created_before || entry.usage_count >= min_usage_to_keep
        });
        Ok((before - entries.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}

//! PostgreSQL-backed caption cache using the `caption_result_cache` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use moodcap_application::{
    CacheAggregate, CacheEntryUpsert, CacheSearchCriteria, ResultCacheRepository,
};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{CacheEntry, CacheKey, Fingerprint};

use crate::store_error::sqlx_error;

/// PostgreSQL implementation of the caption cache port.
#[derive(Clone)]
pub struct PostgresResultCacheRepository {
    pool: PgPool,
}

impl PostgresResultCacheRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CacheEntryRow {
    id: Uuid,
    fingerprint: String,
    prompt: String,
    mood: String,
    captions: Vec<String>,
    owner_id: Option<String>,
    usage_count: i64,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<CacheEntryRow> for CacheEntry {
    type Error = AppError;

    fn try_from(row: CacheEntryRow) -> Result<Self, Self::Error> {
        let fingerprint = Fingerprint::new(row.fingerprint).map_err(|error| {
            AppError::Internal(format!("stored cache fingerprint is invalid: {error}"))
        })?;
        let key = CacheKey::new(fingerprint, Some(row.prompt.as_str()), row.mood.as_str())
            .map_err(|error| AppError::Internal(format!("stored cache key is invalid: {error}")))?;

        Ok(Self {
            id: row.id,
            key,
            captions: row.captions,
            owner_id: row.owner_id,
            usage_count: row.usage_count,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AggregateRow {
    entries: i64,
    total_usage: i64,
    oldest: Option<DateTime<Utc>>,
    newest: Option<DateTime<Utc>>,
}

#[async_trait]
impl ResultCacheRepository for PostgresResultCacheRepository {
    async fn find_and_touch(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            UPDATE caption_result_cache
            SET usage_count = usage_count + 1,
                last_used_at = $4
            WHERE fingerprint = $1
                AND prompt = $2
                AND mood = $3
                AND (expires_at IS NULL OR expires_at > $4)
            RETURNING id, fingerprint, prompt, mood, captions, owner_id,
                usage_count, created_at, last_used_at, expires_at
            "#,
        )
        .bind(key.fingerprint().as_str())
        .bind(key.prompt())
        .bind(key.mood())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| sqlx_error("look up caption cache entry", error))?;

        row.map(CacheEntry::try_from).transpose()
    }

    async fn upsert(&self, input: CacheEntryUpsert, now: DateTime<Utc>) -> AppResult<CacheEntry> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            INSERT INTO caption_result_cache (
                id, fingerprint, prompt, mood, captions, owner_id,
                usage_count, created_at, last_used_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7, $8)
            ON CONFLICT ON CONSTRAINT caption_result_cache_key DO UPDATE
            SET
                id = CASE WHEN caption_result_cache.expires_at <= EXCLUDED.last_used_at
                    THEN EXCLUDED.id ELSE caption_result_cache.id END,
                captions = EXCLUDED.captions,
                owner_id = EXCLUDED.owner_id,
                expires_at = EXCLUDED.expires_at,
                usage_count = CASE WHEN caption_result_cache.expires_at <= EXCLUDED.last_used_at
                    THEN 1 ELSE caption_result_cache.usage_count + 1 END,
                created_at = CASE WHEN caption_result_cache.expires_at <= EXCLUDED.last_used_at
                    THEN EXCLUDED.created_at ELSE caption_result_cache.created_at END,
                last_used_at = EXCLUDED.last_used_at
            RETURNING id, fingerprint, prompt, mood, captions, owner_id,
                usage_count, created_at, last_used_at, expires_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.key.fingerprint().as_str())
        .bind(input.key.prompt())
        .bind(input.key.mood())
        .bind(&input.captions)
        .bind(input.owner_id.as_deref())
        .bind(now)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| sqlx_error("store caption cache entry", error))?;

        CacheEntry::try_from(row)
    }

    async fn aggregate(&self) -> AppResult<CacheAggregate> {
        let row = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT
                COUNT(*)::BIGINT AS entries,
                COALESCE(SUM(usage_count), 0)::BIGINT AS total_usage,
                MIN(created_at) AS oldest,
                MAX(created_at) AS newest
            FROM caption_result_cache
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| sqlx_error("aggregate caption cache", error))?;

        Ok(CacheAggregate {
            entries: row.entries,
            total_usage: row.total_usage,
            oldest: row.oldest,
            newest: row.newest,
        })
    }

    async fn search(
        &self,
        criteria: &CacheSearchCriteria,
        limit: usize,
    ) -> AppResult<Vec<CacheEntry>> {
        let limit = i64::try_from(limit)
            .map_err(|error| AppError::Validation(format!("invalid search limit: {error}")))?;
        let mood = criteria
            .mood
            .as_deref()
            .map(|mood| mood.trim().to_lowercase());

        let rows = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT id, fingerprint, prompt, mood, captions, owner_id,
                usage_count, created_at, last_used_at, expires_at
            FROM caption_result_cache
            WHERE ($1::TEXT IS NULL OR owner_id = $1)
                AND ($2::TEXT IS NULL OR mood = $2)
                AND ($3::TEXT IS NULL OR strpos(lower(prompt), lower($3)) > 0)
                AND ($4::TIMESTAMPTZ IS NULL OR created_at >= $4)
                AND ($5::TIMESTAMPTZ IS NULL OR created_at <= $5)
                AND ($6::BIGINT IS NULL OR usage_count >= $6)
            ORDER BY last_used_at DESC
            LIMIT $7
            "#,
        )
        .bind(criteria.owner_id.as_deref())
        .bind(mood)
        .bind(criteria.prompt_contains.as_deref())
        .bind(criteria.created_from)
        .bind(criteria.created_to)
        .bind(criteria.min_usage)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| sqlx_error("search caption cache", error))?;

        rows.into_iter().map(CacheEntry::try_from).collect()
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM caption_result_cache WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| sqlx_error("delete caption cache entry", error))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_stale(
        &self,
        created_before: DateTime<Utc>,
        min_usage_to_keep: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM caption_result_cache
            WHERE created_at < $1
                AND usage_count < $2
            "#,
        )
        .bind(created_before)
        .bind(min_usage_to_keep)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("clean stale caption cache entries", error))?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM caption_result_cache
            WHERE expires_at IS NOT NULL
                AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("purge expired caption cache entries", error))?;

        Ok(result.rows_affected())
    }
}

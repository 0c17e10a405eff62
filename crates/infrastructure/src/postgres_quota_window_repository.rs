//! PostgreSQL-backed quota windows using the `generation_quota_windows` table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};

use moodcap_application::{QuotaConsumption, QuotaWindowRepository};
use moodcap_core::AppResult;
use moodcap_domain::QuotaWindow;

use crate::store_error::sqlx_error;

/// PostgreSQL implementation of the quota window port.
#[derive(Clone)]
pub struct PostgresQuotaWindowRepository {
    pool: PgPool,
}

impl PostgresQuotaWindowRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ConsumptionRow {
    count: i64,
    window_reset_at: DateTime<Utc>,
    last_allowed: bool,
}

#[derive(Debug, FromRow)]
struct QuotaWindowRow {
    key: String,
    count: i64,
    window_reset_at: DateTime<Utc>,
}

#[async_trait]
impl QuotaWindowRepository for PostgresQuotaWindowRepository {
    async fn consume(
        &self,
        key: &str,
        max_generations: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        // Every CASE reads the pre-update row, so the decision and the
        // increment happen in one statement under the row lock.
        let row = sqlx::query_as::<_, ConsumptionRow>(
            r#"
            INSERT INTO generation_quota_windows AS w (key, count, window_reset_at, last_allowed)
            VALUES ($1, 1, $3, TRUE)
            ON CONFLICT (key) DO UPDATE
            SET
                count = CASE
                    WHEN w.window_reset_at <= $2 THEN 1
                    WHEN w.count >= $4 THEN w.count
                    ELSE w.count + 1
                END,
                window_reset_at = CASE
                    WHEN w.window_reset_at <= $2 THEN $3
                    ELSE w.window_reset_at
                END,
                last_allowed = (w.window_reset_at <= $2 OR w.count < $4)
            RETURNING count, window_reset_at, last_allowed
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(now + window)
        .bind(max_generations)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| sqlx_error("record quota usage", error))?;

        Ok(QuotaConsumption {
            count: row.count,
            window_reset_at: row.window_reset_at,
            allowed: row.last_allowed,
        })
    }

    async fn find(&self, key: &str) -> AppResult<Option<QuotaWindow>> {
        let row = sqlx::query_as::<_, QuotaWindowRow>(
            r#"
            SELECT key, count, window_reset_at
            FROM generation_quota_windows
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| sqlx_error("load quota window", error))?;

        Ok(row.map(|row| QuotaWindow {
            key: row.key,
            count: row.count,
            window_reset_at: row.window_reset_at,
        }))
    }

    async fn reset_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM generation_quota_windows")
            .execute(&self.pool)
            .await
            .map_err(|error| sqlx_error("reset quota windows", error))?;

        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM generation_quota_windows
            WHERE window_reset_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("cleanup expired quota windows", error))?;

        Ok(result.rows_affected())
    }
}

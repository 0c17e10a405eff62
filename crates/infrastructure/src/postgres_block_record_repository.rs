//! PostgreSQL-backed block list using the `block_records` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use moodcap_application::BlockRecordRepository;
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{BlockEscalation, BlockOffense, BlockRecord, Credential};

use crate::store_error::sqlx_error;

/// PostgreSQL implementation of the block record port.
#[derive(Clone)]
pub struct PostgresBlockRecordRepository {
    pool: PgPool,
}

impl PostgresBlockRecordRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BlockRecordRow {
    credential: String,
    blocked_until: DateTime<Utc>,
    attempts: i64,
    reason: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl TryFrom<BlockRecordRow> for BlockRecord {
    type Error = AppError;

    fn try_from(row: BlockRecordRow) -> Result<Self, Self::Error> {
        let credential = Credential::new(row.credential.as_str()).map_err(|error| {
            AppError::Internal(format!("stored block credential is invalid: {error}"))
        })?;

        Ok(Self {
            credential,
            blocked_until: row.blocked_until,
            attempts: row.attempts,
            reason: row.reason,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
        })
    }
}

#[async_trait]
impl BlockRecordRepository for PostgresBlockRecordRepository {
    async fn record_offense(
        &self,
        offense: &BlockOffense,
        escalation: BlockEscalation,
        now: DateTime<Utc>,
    ) -> AppResult<BlockRecord> {
        let row = sqlx::query_as::<_, BlockRecordRow>(
            r#"
            INSERT INTO block_records AS b (
                credential, blocked_until, attempts, reason,
                ip_address, user_agent, created_at, updated_at
            )
            VALUES ($1, $2 + make_interval(hours => LEAST($6, $7)::INT), 1, $3, $4, $5, $2, $2)
            ON CONFLICT (credential) DO UPDATE
            SET
                attempts = CASE
                    WHEN b.blocked_until < $2 THEN 1
                    ELSE b.attempts + 1
                END,
                blocked_until = $2 + make_interval(hours => LEAST(
                    CASE
                        WHEN b.blocked_until < $2 THEN 1
                        ELSE b.attempts + 1
                    END * $6,
                    $7
                )::INT),
                reason = EXCLUDED.reason,
                ip_address = COALESCE(EXCLUDED.ip_address, b.ip_address),
                user_agent = COALESCE(EXCLUDED.user_agent, b.user_agent),
                updated_at = $2
            RETURNING credential, blocked_until, attempts, reason, ip_address, user_agent
            "#,
        )
        .bind(offense.credential.as_str())
        .bind(now)
        .bind(offense.reason.as_str())
        .bind(offense.ip_address.as_deref())
        .bind(offense.user_agent.as_deref())
        .bind(escalation.hours_per_offense())
        .bind(escalation.max_hours())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| sqlx_error("record block offense", error))?;

        BlockRecord::try_from(row)
    }

    async fn find(&self, credential: &Credential) -> AppResult<Option<BlockRecord>> {
        let row = sqlx::query_as::<_, BlockRecordRow>(
            r#"
            SELECT credential, blocked_until, attempts, reason, ip_address, user_agent
            FROM block_records
            WHERE credential = $1
            "#,
        )
        .bind(credential.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| sqlx_error("load block record", error))?;

        row.map(BlockRecord::try_from).transpose()
    }

    async fn delete_if_lapsed(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM block_records
            WHERE credential = $1
                AND blocked_until < $2
            "#,
        )
        .bind(credential.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| sqlx_error("remove lapsed block record", error))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, credential: &Credential) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM block_records WHERE credential = $1")
            .bind(credential.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| sqlx_error("delete block record", error))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_lapsed(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM block_records WHERE blocked_until < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|error| sqlx_error("purge lapsed block records", error))?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM block_records")
            .execute(&self.pool)
            .await
            .map_err(|error| sqlx_error("clear block records", error))?;

        Ok(result.rows_affected())
    }
}

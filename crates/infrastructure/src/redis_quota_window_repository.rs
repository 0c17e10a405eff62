//! Redis-backed quota windows.
//!
//! Each identity is a hash `{prefix}:{key}` with `count` and `reset_at`
//! (epoch milliseconds). The key expires with its window.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use moodcap_application::{QuotaConsumption, QuotaWindowRepository};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::QuotaWindow;
use redis::Script;

use crate::store_error::redis_error;

const CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local max = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])

local fields = redis.call('HMGET', key, 'count', 'reset_at')
local count = tonumber(fields[1])
local reset_at = tonumber(fields[2])

if count == nil or reset_at == nil or reset_at <= now_ms then
  reset_at = now_ms + window_ms
  redis.call('HSET', key, 'count', 1, 'reset_at', reset_at)
  redis.call('PEXPIREAT', key, reset_at)
  return {1, reset_at, 1}
end

if count >= max then
  return {count, reset_at, 0}
end

count = redis.call('HINCRBY', key, 'count', 1)
return {count, reset_at, 1}
"#;

const SCAN_BATCH: usize = 500;

/// Redis implementation of the quota window port.
#[derive(Clone)]
pub struct RedisQuotaWindowRepository {
    client: redis::Client,
    key_prefix: String,
}

impl RedisQuotaWindowRepository {
    /// Creates a repository with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| redis_error("connect to redis", error))
    }
}

fn timestamp_from_millis(value: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value)
        .single()
        .ok_or_else(|| AppError::Internal(format!("invalid redis quota timestamp: {value}")))
}

#[async_trait]
impl QuotaWindowRepository for RedisQuotaWindowRepository {
    async fn consume(
        &self,
        key: &str,
        max_generations: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        let mut connection = self.connection().await?;

        let (count, reset_at_ms, allowed): (i64, i64, i64) = Script::new(CONSUME_SCRIPT)
            .key(self.key_for(key))
            .arg(max_generations)
            .arg(window.num_milliseconds())
            .arg(now.timestamp_millis())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| redis_error("record redis quota usage", error))?;

        Ok(QuotaConsumption {
            count,
            window_reset_at: timestamp_from_millis(reset_at_ms)?,
            allowed: allowed == 1,
        })
    }

    async fn find(&self, key: &str) -> AppResult<Option<QuotaWindow>> {
        let mut connection = self.connection().await?;

        let (count, reset_at_ms): (Option<i64>, Option<i64>) = redis::cmd("HMGET")
            .arg(self.key_for(key))
            .arg("count")
            .arg("reset_at")
            .query_async(&mut connection)
            .await
            .map_err(|error| redis_error("load redis quota window", error))?;

        match (count, reset_at_ms) {
            (Some(count), Some(reset_at_ms)) => Ok(Some(QuotaWindow {
                key: key.to_owned(),
                count,
                window_reset_at: timestamp_from_millis(reset_at_ms)?,
            })),
            _ => Ok(None),
        }
    }

    async fn reset_all(&self) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        let pattern = format!("{}:*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection)
                .await
                .map_err(|error| redis_error("scan redis quota windows", error))?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL")
                    .arg(keys)
                    .query_async(&mut connection)
                    .await
                    .map_err(|error| redis_error("delete redis quota windows", error))?;
                removed += deleted;
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(removed)
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> AppResult<u64> {
        // Window keys expire with PEXPIREAT.
        Ok(0)
    }
}

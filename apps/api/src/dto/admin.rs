use moodcap_application::{BlockStatus, CacheStats, QuotaStatus};
use moodcap_domain::{BlockRecord, CacheEntry};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::timestamp;

/// Wrapper returned by every administrative endpoint.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/admin-envelope.ts"
)]
pub struct AdminEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> AdminEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/cache-stats-response.ts"
)]
pub struct CacheStatsResponse {
    #[ts(type = "number")]
    pub entries: i64,
    #[ts(type = "number")]
    pub total_usage: i64,
    pub average_usage: f64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
    #[ts(type = "number")]
    pub quota_saved: i64,
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(value: CacheStats) -> Self {
        Self {
            entries: value.entries,
            total_usage: value.total_usage,
            average_usage: value.average_usage,
            oldest: value.oldest.map(timestamp),
            newest: value.newest.map(timestamp),
            quota_saved: value.quota_saved,
            hit_rate: value.hit_rate(),
        }
    }
}

/// Cache hit rate in percent.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/hit-rate-response.ts"
)]
pub struct HitRateResponse {
    pub hit_rate: f64,
}

/// API representation of a cache entry.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/cache-entry-response.ts"
)]
pub struct CacheEntryResponse {
    pub id: String,
    pub fingerprint: String,
    pub prompt: String,
    pub mood: String,
    pub captions: Vec<String>,
    pub owner_id: Option<String>,
    #[ts(type = "number")]
    pub usage_count: i64,
    pub created_at: String,
    pub last_used_at: String,
    pub expires_at: Option<String>,
}

impl From<CacheEntry> for CacheEntryResponse {
    fn from(value: CacheEntry) -> Self {
        Self {
            id: value.id.to_string(),
            fingerprint: value.key.fingerprint().as_str().to_owned(),
            prompt: value.key.prompt().to_owned(),
            mood: value.key.mood().to_owned(),
            captions: value.captions,
            owner_id: value.owner_id,
            usage_count: value.usage_count,
            created_at: timestamp(value.created_at),
            last_used_at: timestamp(value.last_used_at),
            expires_at: value.expires_at.map(timestamp),
        }
    }
}

/// Incoming payload for age-based cache cleanup.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/cache-cleanup-request.ts"
)]
pub struct CacheCleanupRequest {
    #[ts(type = "number")]
    pub older_than_days: i64,
}

/// Outcome of a single-record delete.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/deleted-response.ts"
)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Number of records removed by a bulk operation.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/removed-count-response.ts"
)]
pub struct RemovedCountResponse {
    #[ts(type = "number")]
    pub removed: u64,
}

/// Read-only quota view of one identity.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/quota-status-response.ts"
)]
pub struct QuotaStatusResponse {
    pub key: String,
    #[ts(type = "number")]
    pub count: i64,
    #[ts(type = "number")]
    pub limit: i64,
    #[ts(type = "number")]
    pub remaining: i64,
    pub reset_at: Option<String>,
    pub active: bool,
}

impl From<QuotaStatus> for QuotaStatusResponse {
    fn from(value: QuotaStatus) -> Self {
        Self {
            key: value.key,
            count: value.count,
            limit: value.limit,
            remaining: value.remaining,
            reset_at: value.reset_at.map(timestamp),
            active: value.active,
        }
    }
}

/// Incoming abuse report.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/block-request.ts"
)]
pub struct BlockRequest {
    pub credential: String,
    pub reason: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Block record after an offense was recorded.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/block-record-response.ts"
)]
pub struct BlockRecordResponse {
    pub credential: String,
    pub blocked_until: String,
    #[ts(type = "number")]
    pub attempts: i64,
    pub reason: String,
}

impl From<BlockRecord> for BlockRecordResponse {
    fn from(value: BlockRecord) -> Self {
        Self {
            credential: value.credential.as_str().to_owned(),
            blocked_until: timestamp(value.blocked_until),
            attempts: value.attempts,
            reason: value.reason,
        }
    }
}

/// Current block state of a credential.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/block-status-response.ts"
)]
pub struct BlockStatusResponse {
    pub blocked: bool,
    pub blocked_until: Option<String>,
    #[ts(type = "number | null")]
    pub attempts: Option<i64>,
    #[ts(type = "number | null")]
    pub hours_remaining: Option<i64>,
    pub reason: Option<String>,
}

impl From<BlockStatus> for BlockStatusResponse {
    fn from(value: BlockStatus) -> Self {
        Self {
            blocked: value.blocked,
            blocked_until: value.blocked_until.map(timestamp),
            attempts: value.attempts,
            hours_remaining: value.hours_remaining,
            reason: value.reason,
        }
    }
}

mod admin;
mod captions;
mod health;

pub use admin::{
    AdminEnvelope, BlockRecordResponse, BlockRequest, BlockStatusResponse, CacheCleanupRequest,
    CacheEntryResponse, CacheStatsResponse, DeletedResponse, HitRateResponse,
    QuotaStatusResponse, RemovedCountResponse,
};
pub use captions::{
    BlockedResponse, CaptionsResponse, GenerateCaptionsRequest, ImageMetadataInput,
    QuotaExceededResponse, QuotaResponse,
};
pub use health::{
    DurableStoresResponse, HealthDependencyStatus, HealthResponse, StoreHealthResponse,
};

fn timestamp(value: chrono::DateTime<chrono::Utc>) -> String {
    value.to_rfc3339()
}

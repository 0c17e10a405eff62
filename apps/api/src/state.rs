use std::sync::Arc;

use ipnet::IpNet;
use moodcap_application::{AbuseBlockService, CaptionService, QuotaService, ResultCacheService};
use moodcap_infrastructure::{FallbackStores, StoreHealthSet};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub caption_service: CaptionService,
    pub result_cache_service: ResultCacheService,
    pub quota_service: QuotaService,
    pub abuse_block_service: AbuseBlockService,
    pub store_health: StoreHealthSet,
    pub fallback_stores: FallbackStores,
    pub postgres_pool: PgPool,
    pub redis_client: Option<redis::Client>,
    pub redis_required: bool,
    pub admin_api_token: Arc<str>,
    pub trusted_proxies: Arc<[IpNet]>,
}

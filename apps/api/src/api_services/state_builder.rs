use std::sync::Arc;

use moodcap_application::{
    AbuseBlockService, BlockRecordRepository, CaptionService, QuotaService, QuotaWindowRepository,
    ResultCacheRepository, ResultCacheService,
};
use moodcap_core::AppError;
use moodcap_infrastructure::{
    FailoverBlockRecordRepository, FailoverQuotaWindowRepository, FailoverResultCacheRepository,
    FallbackStores, HttpCaptionGenerator, PostgresBlockRecordRepository,
    PostgresQuotaWindowRepository, PostgresResultCacheRepository, RedisQuotaWindowRepository,
    StoreHealthSet,
};
use sqlx::PgPool;
use tracing::info;

use crate::api_config::{ApiConfig, QuotaStoreKind};
use crate::state::AppState;

use super::redis::build_redis_client;

const REDIS_QUOTA_KEY_PREFIX: &str = "moodcap:quota";

pub fn build_app_state(pool: PgPool, config: &ApiConfig) -> Result<AppState, AppError> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?;

    let store_health = StoreHealthSet::new(config.store_retry_after());
    let fallback_stores = FallbackStores::new();
    let timeout = config.store_timeout();

    let cache_repository: Arc<dyn ResultCacheRepository> =
        Arc::new(FailoverResultCacheRepository::new(
            Arc::new(PostgresResultCacheRepository::new(pool.clone())),
            fallback_stores.cache.clone(),
            store_health.cache.clone(),
            timeout,
        ));
    let quota_repository: Arc<dyn QuotaWindowRepository> =
        Arc::new(FailoverQuotaWindowRepository::new(
            durable_quota_repository(&pool, config, redis_client.clone())?,
            fallback_stores.quota.clone(),
            store_health.quota.clone(),
            timeout,
        ));
    let block_repository: Arc<dyn BlockRecordRepository> =
        Arc::new(FailoverBlockRecordRepository::new(
            Arc::new(PostgresBlockRecordRepository::new(pool.clone())),
            fallback_stores.blocks.clone(),
            store_health.blocks.clone(),
            timeout,
        ));

    let result_cache_service = ResultCacheService::new(cache_repository)
        .with_entry_ttl(config.cache_entry_ttl());
    let quota_service = QuotaService::new(quota_repository, config.quota_policy);
    let abuse_block_service = AbuseBlockService::new(block_repository, config.block_escalation);

    let http_client = HttpCaptionGenerator::client_with_timeout(config.generation_backend_timeout())?;
    let generator = Arc::new(HttpCaptionGenerator::new(
        http_client,
        config.generation_backend_url.as_str(),
        config.generation_backend_api_key.clone(),
        config.generation_backend_max_attempts,
        250,
    ));

    Ok(AppState {
        caption_service: CaptionService::new(
            abuse_block_service.clone(),
            quota_service.clone(),
            result_cache_service.clone(),
            generator,
        ),
        result_cache_service,
        quota_service,
        abuse_block_service,
        store_health,
        fallback_stores,
        postgres_pool: pool,
        redis_client,
        redis_required: config.requires_redis(),
        admin_api_token: Arc::from(config.admin_api_token.as_str()),
        trusted_proxies: Arc::from(config.trusted_proxies.as_slice()),
    })
}

fn durable_quota_repository(
    pool: &PgPool,
    config: &ApiConfig,
    redis_client: Option<redis::Client>,
) -> Result<Arc<dyn QuotaWindowRepository>, AppError> {
    match config.quota_store {
        QuotaStoreKind::Postgres => {
            info!("quota windows stored in postgres");
            Ok(Arc::new(PostgresQuotaWindowRepository::new(pool.clone())))
        }
        QuotaStoreKind::Redis => {
            let redis_client = redis_client.ok_or_else(|| {
                AppError::Validation("REDIS_URL is required when QUOTA_STORE=redis".to_owned())
            })?;
            info!("quota windows stored in redis");
            Ok(Arc::new(RedisQuotaWindowRepository::new(
                redis_client,
                REDIS_QUOTA_KEY_PREFIX,
            )))
        }
    }
}

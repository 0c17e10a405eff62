//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod failover;
mod http_caption_generator;
mod in_memory_block_record_repository;
mod in_memory_quota_window_repository;
mod in_memory_result_cache_repository;
mod postgres_block_record_repository;
mod postgres_quota_window_repository;
mod postgres_result_cache_repository;
mod redis_quota_window_repository;
mod store_error;

#[cfg(test)]
mod tests;

pub use failover::{
    FailoverBlockRecordRepository, FailoverQuotaWindowRepository, FailoverResultCacheRepository,
    FALLBACK_CACHE_TTL_MINUTES, FallbackStores, FallbackSweep, StoreHealth, StoreHealthSet,
    StoreHealthSnapshot,
};
pub use http_caption_generator::HttpCaptionGenerator;
pub use in_memory_block_record_repository::InMemoryBlockRecordRepository;
pub use in_memory_quota_window_repository::InMemoryQuotaWindowRepository;
pub use in_memory_result_cache_repository::InMemoryResultCacheRepository;
pub use postgres_block_record_repository::PostgresBlockRecordRepository;
pub use postgres_quota_window_repository::PostgresQuotaWindowRepository;
pub use postgres_result_cache_repository::PostgresResultCacheRepository;
pub use redis_quota_window_repository::RedisQuotaWindowRepository;

/// Embedded migrations for the durable store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

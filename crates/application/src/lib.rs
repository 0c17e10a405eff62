//! Application services and ports.

#![forbid(unsafe_code)]

mod abuse_block_service;
mod caption_service;
mod clock;
mod fingerprint_service;
mod quota_service;
mod result_cache_service;

pub use abuse_block_service::{AbuseBlockService, BlockRecordRepository, BlockStatus};
pub use caption_service::{
    CaptionGenerator, CaptionService, GenerationOutcome, GenerationRequest,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint_service::FingerprintService;
pub use quota_service::{
    DEFAULT_ANONYMOUS_MAX_GENERATIONS, DEFAULT_AUTHENTICATED_MAX_GENERATIONS,
    DEFAULT_QUOTA_WINDOW_HOURS, MAX_QUOTA_WINDOW_HOURS, QuotaCheck, QuotaConsumption,
    QuotaPolicy, QuotaRule, QuotaService, QuotaStatus, QuotaWindowRepository,
};
pub use result_cache_service::{
    CACHE_SEARCH_PAGE_SIZE, CLEANUP_PROTECTED_USAGE, CacheAggregate, CacheEntryUpsert,
    CacheLookup, CacheSearchCriteria, CacheStats, ResultCacheRepository, ResultCacheService,
};

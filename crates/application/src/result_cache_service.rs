//! Caption result cache ports and application service.
//!
//! Keeps at most one caption set per `(fingerprint, prompt, mood)` triple and
//! counts how often each set is reused so administrators can see how many
//! generation calls the cache saved.

mod ports;
mod service;


pub use ports::{CacheAggregate, CacheEntryUpsert, CacheSearchCriteria, ResultCacheRepository};
pub use service::{
    CACHE_SEARCH_PAGE_SIZE, CLEANUP_PROTECTED_USAGE, CacheLookup, CacheStats, ResultCacheService,
};

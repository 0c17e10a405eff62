use chrono::{DateTime, Utc};
use moodcap_application::CacheSearchCriteria;
use uuid::Uuid;

use super::*;

#[derive(Debug, serde::Deserialize)]
pub struct CacheSearchQuery {
    pub owner_id: Option<String>,
    pub mood: Option<String>,
    pub prompt_contains: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub min_usage: Option<i64>,
}

impl From<CacheSearchQuery> for CacheSearchCriteria {
    fn from(value: CacheSearchQuery) -> Self {
        Self {
            owner_id: value.owner_id,
            mood: value.mood,
            prompt_contains: value.prompt_contains,
            created_from: value.created_from,
            created_to: value.created_to,
            min_usage: value.min_usage,
        }
    }
}

pub async fn cache_stats_handler(State(state): State<AppState>) -> AdminResponse<CacheStatsResponse> {
    let result = state.result_cache_service.stats().await.map(Into::into);
    respond("cache_stats", result)
}

pub async fn hit_rate_handler(State(state): State<AppState>) -> AdminResponse<HitRateResponse> {
    let result = state
        .result_cache_service
        .hit_rate()
        .await
        .map(|hit_rate| HitRateResponse { hit_rate });
    respond("cache_hit_rate", result)
}

pub async fn search_cache_handler(
    State(state): State<AppState>,
    query: Result<Query<CacheSearchQuery>, QueryRejection>,
) -> AdminResponse<Vec<CacheEntryResponse>> {
    let result = match query {
        Ok(Query(query)) => state
            .result_cache_service
            .search(&query.into())
            .await
            .map(|entries| entries.into_iter().map(CacheEntryResponse::from).collect()),
        Err(rejection) => rejected(rejection),
    };
    respond("cache_search", result)
}

pub async fn delete_cache_entry_handler(
    State(state): State<AppState>,
    entry_id: Result<Path<Uuid>, PathRejection>,
) -> AdminResponse<DeletedResponse> {
    let result = match entry_id {
        Ok(Path(entry_id)) => state
            .result_cache_service
            .delete_by_id(entry_id)
            .await
            .map(|deleted| DeletedResponse { deleted }),
        Err(rejection) => rejected(rejection),
    };
    respond("cache_delete", result)
}

pub async fn cleanup_cache_handler(
    State(state): State<AppState>,
    payload: Result<Json<CacheCleanupRequest>, JsonRejection>,
) -> AdminResponse<RemovedCountResponse> {
    let result = match payload {
        Ok(Json(payload)) => state
            .result_cache_service
            .clean_older_than(payload.older_than_days)
            .await
            .map(|removed| RemovedCountResponse { removed }),
        Err(rejection) => rejected(rejection),
    };
    respond("cache_cleanup", result)
}

pub async fn purge_expired_cache_handler(
    State(state): State<AppState>,
) -> AdminResponse<RemovedCountResponse> {
    let result = state
        .result_cache_service
        .purge_expired()
        .await
        .map(|removed| RemovedCountResponse { removed });
    respond("cache_purge_expired", result)
}

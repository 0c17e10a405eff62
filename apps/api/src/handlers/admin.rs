//! Administrative endpoints. Every response, success or failure, is an
//! `AdminEnvelope`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use moodcap_core::{AppError, AppResult};
use serde::Serialize;
use tracing::warn;

use crate::dto::{
    AdminEnvelope, BlockRecordResponse, BlockRequest, BlockStatusResponse, CacheCleanupRequest,
    CacheEntryResponse, CacheStatsResponse, DeletedResponse, HitRateResponse,
    QuotaStatusResponse, RemovedCountResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

mod blocks;
mod cache;
mod quota;

pub use blocks::{
    block_credential_handler, block_status_handler, reactivate_all_handler,
    unblock_credential_handler,
};
pub use cache::{
    cache_stats_handler, cleanup_cache_handler, delete_cache_entry_handler, hit_rate_handler,
    purge_expired_cache_handler, search_cache_handler,
};
pub use quota::{quota_status_handler, reset_quota_windows_handler};

/// Status code and envelope returned by admin handlers.
pub type AdminResponse<T> = (StatusCode, Json<AdminEnvelope<T>>);

fn respond<T: Serialize>(operation: &str, result: AppResult<T>) -> AdminResponse<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(AdminEnvelope::ok(data))),
        Err(error) => {
            let api_error = ApiError(error);
            let status = api_error.status_code();
            if status.is_server_error() {
                warn!(operation, error = %api_error.0, "admin operation failed");
            }
            (status, Json(AdminEnvelope::failed(api_error.0.to_string())))
        }
    }
}

fn rejected<T>(rejection: impl std::fmt::Display) -> AppResult<T> {
    Err(AppError::Validation(rejection.to_string()))
}

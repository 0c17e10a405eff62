use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};

use crate::state::AppState;
use crate::{handlers, middleware};

pub(super) fn build_admin_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/cache/stats",
            get(handlers::admin::cache_stats_handler),
        )
        .route(
            "/api/admin/cache/hit-rate",
            get(handlers::admin::hit_rate_handler),
        )
        .route(
            "/api/admin/cache/entries",
            get(handlers::admin::search_cache_handler),
        )
        .route(
            "/api/admin/cache/entries/{entry_id}",
            delete(handlers::admin::delete_cache_entry_handler),
        )
        .route(
            "/api/admin/cache/cleanup",
            post(handlers::admin::cleanup_cache_handler),
        )
        .route(
            "/api/admin/cache/purge-expired",
            post(handlers::admin::purge_expired_cache_handler),
        )
        .route(
            "/api/admin/quota/reset",
            post(handlers::admin::reset_quota_windows_handler),
        )
        .route(
            "/api/admin/quota/{identity}",
            get(handlers::admin::quota_status_handler),
        )
        .route(
            "/api/admin/blocks",
            post(handlers::admin::block_credential_handler),
        )
        .route(
            "/api/admin/blocks/reactivate-all",
            post(handlers::admin::reactivate_all_handler),
        )
        .route(
            "/api/admin/blocks/{credential}",
            get(handlers::admin::block_status_handler)
                .delete(handlers::admin::unblock_credential_handler),
        )
        .route_layer(from_fn_with_state(
            app_state,
            middleware::require_admin_token,
        ))
}

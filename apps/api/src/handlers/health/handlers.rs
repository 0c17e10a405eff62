use super::checks::{check_postgres, check_redis};
use super::*;

/// Readiness plus the durable-store failover signals.
///
/// `ready` covers the dependencies this instance needs to serve from shared
/// state. A degraded instance still answers requests from its local
/// fallback, so `durable_store.degraded` (set when any collection is degraded)
/// downgrades `status` without failing readiness on its own.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let postgres = check_postgres(state.postgres_pool.clone()).await;
    let redis = check_redis(state.redis_client.clone(), state.redis_required).await;
    let [result_cache, quota, abuse_block] = state.store_health.snapshots();
    let durable_store = StoreHealthSnapshot::combine([&result_cache, &quota, &abuse_block]);

    let ready = is_healthy(postgres.status) && (is_healthy(redis.status) || !state.redis_required);
    let status = if ready && !durable_store.degraded {
        "ok"
    } else {
        "degraded"
    };
    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            ready,
            postgres,
            redis,
            durable_store: durable_store.into(),
            durable_stores: DurableStoresResponse {
                result_cache: result_cache.into(),
                quota: quota.into(),
                abuse_block: abuse_block.into(),
            },
        }),
    )
}

fn is_healthy(status: &str) -> bool {
    status == "ok"
}

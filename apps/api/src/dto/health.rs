use moodcap_infrastructure::StoreHealthSnapshot;
use serde::Serialize;
use ts_rs::TS;

use super::timestamp;

/// Status of one backing dependency.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/health-dependency-status.ts"
)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    pub detail: Option<String>,
}

/// Failover state of the durable stores.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/store-health-response.ts"
)]
pub struct StoreHealthResponse {
    pub degraded: bool,
    pub degraded_since: Option<String>,
    pub last_error: Option<String>,
    pub last_failure_at: Option<String>,
    #[ts(type = "number")]
    pub failovers: u64,
}

impl From<StoreHealthSnapshot> for StoreHealthResponse {
    fn from(value: StoreHealthSnapshot) -> Self {
        Self {
            degraded: value.degraded,
            degraded_since: value.degraded_since.map(timestamp),
            last_error: value.last_error,
            last_failure_at: value.last_failure_at.map(timestamp),
            failovers: value.failovers,
        }
    }
}

/// Failover state of each durable collection.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/durable-stores-response.ts"
)]
pub struct DurableStoresResponse {
    pub result_cache: StoreHealthResponse,
    pub quota: StoreHealthResponse,
    pub abuse_block: StoreHealthResponse,
}

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub postgres: HealthDependencyStatus,
    pub redis: HealthDependencyStatus,
    pub durable_store: StoreHealthResponse,
    pub durable_stores: DurableStoresResponse,
}

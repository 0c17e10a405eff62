use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use moodcap_infrastructure::StoreHealthSnapshot;

use crate::dto::{DurableStoresResponse, HealthDependencyStatus, HealthResponse};
use crate::state::AppState;

mod checks;
mod handlers;

pub use handlers::health_handler;

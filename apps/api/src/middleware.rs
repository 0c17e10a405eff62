use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::dto::AdminEnvelope;
use crate::state::AppState;

/// Rejects admin requests that do not carry the configured bearer token.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(presented) = presented else {
        return unauthorized("admin bearer token required");
    };

    if !bool::from(presented.as_bytes().ct_eq(state.admin_api_token.as_bytes())) {
        warn!(
            path = %request.uri().path(),
            "rejected admin request with invalid token"
        );
        return unauthorized("invalid admin token");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(AdminEnvelope::<()>::failed(message)),
    )
        .into_response()
}

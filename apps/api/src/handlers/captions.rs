use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use moodcap_application::{GenerationOutcome, GenerationRequest};
use tracing::debug;

use crate::client_identity::resolve_client_identity;
use crate::dto::{BlockedResponse, CaptionsResponse, GenerateCaptionsRequest, QuotaExceededResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn generate_captions_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<GenerateCaptionsRequest>,
) -> ApiResult<Response> {
    let client = resolve_client_identity(peer.ip(), &headers, &state.trusted_proxies)?;
    debug!(
        identity = %client.identity,
        ip_address = %client.ip_address,
        user_agent = client.user_agent.as_deref().unwrap_or("-"),
        "caption request"
    );

    let image = payload.image_source();
    let outcome = state
        .caption_service
        .generate(GenerationRequest {
            identity: client.identity,
            credential: payload.credential,
            image,
            metadata: payload.metadata.map(Into::into),
            prompt: payload.prompt,
            mood: payload.mood,
        })
        .await?;

    Ok(match outcome {
        GenerationOutcome::Generated {
            captions,
            cached,
            quota,
        } => (
            StatusCode::OK,
            Json(CaptionsResponse {
                captions,
                cached,
                quota: quota.into(),
            }),
        )
            .into_response(),
        GenerationOutcome::Blocked(status) => {
            (StatusCode::FORBIDDEN, Json(BlockedResponse::from(status))).into_response()
        }
        GenerationOutcome::QuotaExceeded(quota) => {
            let retry_after = (quota.reset_at - Utc::now()).num_seconds().max(0);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(QuotaExceededResponse::from(quota)),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(retry_after.to_string().as_str()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    })
}

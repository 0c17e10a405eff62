use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use moodcap_application::CaptionGenerator;
use moodcap_core::{AppError, AppResult};
use moodcap_domain::ImageSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Calls the caption generation backend over HTTP.
///
/// Transport errors, `5xx` and `429` responses are retried with linear
/// backoff. Rejected credentials are an internal error. Other non-success
/// statuses are returned as validation errors. Upstream response bodies are
/// logged, never returned to the caller.
pub struct HttpCaptionGenerator {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_attempts: u8,
    retry_backoff_ms: u64,
}

impl HttpCaptionGenerator {
    /// Creates a generator for `endpoint`. Timeouts are configured on the
    /// client.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            api_key,
            max_attempts: max_attempts.max(1),
            retry_backoff_ms: retry_backoff_ms.max(50),
        }
    }

    /// Builds a client with the request timeout used for generation calls.
    pub fn client_with_timeout(timeout: Duration) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build generation http client: {error}"))
            })
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct GenerationPayload<'a> {
    image: ImagePayload<'a>,
    prompt: &'a str,
    mood: &'a str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
enum ImagePayload<'a> {
    Inline(std::borrow::Cow<'a, str>),
    Reference(&'a str),
}

impl<'a> ImagePayload<'a> {
    fn from_source(image: &'a ImageSource) -> Self {
        match image {
            ImageSource::Inline(encoded) => Self::Inline(encoded.as_str().into()),
            ImageSource::Bytes(bytes) => Self::Inline(STANDARD.encode(bytes).into()),
            ImageSource::Reference(reference) => Self::Reference(reference.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    captions: Vec<String>,
}

fn clean_captions(captions: Vec<String>) -> Vec<String> {
    captions
        .into_iter()
        .map(|caption| caption.trim().to_owned())
        .filter(|caption| !caption.is_empty())
        .collect()
}

#[async_trait]
impl CaptionGenerator for HttpCaptionGenerator {
    async fn generate(
        &self,
        image: &ImageSource,
        prompt: &str,
        mood: &str,
    ) -> AppResult<Vec<String>> {
        let payload = GenerationPayload {
            image: ImagePayload::from_source(image),
            prompt,
            mood,
        };

        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);

            let mut builder = self.http_client.post(self.endpoint.as_str()).json(&payload);
            if let Some(api_key) = &self.api_key {
                builder = builder.bearer_auth(api_key);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let body = response.json::<GenerationResponse>().await.map_err(|error| {
                        AppError::Internal(format!(
                            "failed to decode generation backend response: {error}"
                        ))
                    })?;
                    debug!(attempt, mood, "generation backend answered");
                    return Ok(clean_captions(body.captions));
                }
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} from generation backend",
                        response.status()
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    warn!(
                        %status,
                        body = %truncated(&body),
                        "generation backend rejected the request"
                    );
                    return Err(rejection_error(status));
                }
                Err(error) => {
                    last_error = Some(format!("generation backend transport error: {error}"));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Unavailable(last_error.unwrap_or_else(|| {
            "generation backend exhausted retries".to_owned()
        })))
    }
}

const LOGGED_BODY_LIMIT: usize = 512;

fn rejection_error(status: reqwest::StatusCode) -> AppError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => AppError::Internal(
            format!("generation backend refused the configured credentials (status {status})"),
        ),
        _ => AppError::Validation(format!(
            "generation backend rejected the request with status {status}"
        )),
    }
}

fn truncated(body: &str) -> &str {
    match body.char_indices().nth(LOGGED_BODY_LIMIT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

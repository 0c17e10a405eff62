use moodcap_application::{BlockStatus, QuotaCheck};
use moodcap_domain::{ImageKind, ImageMetadata, ImageSource};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::timestamp;

/// Optional descriptive metadata about the submitted image.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/image-metadata-input.ts"
)]
pub struct ImageMetadataInput {
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[ts(type = "number | null")]
    pub size: Option<u64>,
    pub format: Option<String>,
    pub name: Option<String>,
}

impl From<ImageMetadataInput> for ImageMetadata {
    fn from(value: ImageMetadataInput) -> Self {
        Self {
            width: value.width,
            height: value.height,
            size: value.size,
            format: value.format,
            name: value.name,
        }
    }
}

/// Declared reading of [`GenerateCaptionsRequest::image`].
#[derive(Debug, Clone, Copy, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/image-kind-input.ts"
)]
pub enum ImageKindInput {
    Inline,
    Reference,
}

impl From<ImageKindInput> for ImageKind {
    fn from(value: ImageKindInput) -> Self {
        match value {
            ImageKindInput::Inline => Self::Inline,
            ImageKindInput::Reference => Self::Reference,
        }
    }
}

/// Incoming payload for caption generation.
///
/// `image` is a data URL, raw base64, an `http(s)` URL, or a content-store
/// identifier. Without `image_kind` the server classifies it.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/generate-captions-request.ts"
)]
pub struct GenerateCaptionsRequest {
    pub image: String,
    pub image_kind: Option<ImageKindInput>,
    pub mood: String,
    pub prompt: Option<String>,
    pub credential: Option<String>,
    pub metadata: Option<ImageMetadataInput>,
}

impl GenerateCaptionsRequest {
    pub fn image_source(&self) -> ImageSource {
        match self.image_kind {
            Some(kind) => ImageSource::with_kind(self.image.as_str(), kind.into()),
            None => ImageSource::from_text(self.image.as_str()),
        }
    }
}

/// Quota state reported with each generation.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/quota-response.ts"
)]
pub struct QuotaResponse {
    pub allowed: bool,
    #[ts(type = "number")]
    pub remaining: i64,
    pub reset_at: String,
}

impl From<QuotaCheck> for QuotaResponse {
    fn from(value: QuotaCheck) -> Self {
        Self {
            allowed: value.allowed,
            remaining: value.remaining,
            reset_at: timestamp(value.reset_at),
        }
    }
}

/// Generated or cached captions.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/captions-response.ts"
)]
pub struct CaptionsResponse {
    pub captions: Vec<String>,
    pub cached: bool,
    pub quota: QuotaResponse,
}

/// Rejection for an exhausted quota window.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/quota-exceeded-response.ts"
)]
pub struct QuotaExceededResponse {
    pub message: String,
    #[ts(type = "number")]
    pub remaining: i64,
    pub reset_at: String,
}

impl From<QuotaCheck> for QuotaExceededResponse {
    fn from(value: QuotaCheck) -> Self {
        Self {
            message: "generation quota exhausted for the current window".to_owned(),
            remaining: value.remaining,
            reset_at: timestamp(value.reset_at),
        }
    }
}

/// Rejection for a blocked credential.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/blocked-response.ts"
)]
pub struct BlockedResponse {
    pub message: String,
    pub blocked_until: Option<String>,
    #[ts(type = "number | null")]
    pub hours_remaining: Option<i64>,
    pub reason: Option<String>,
}

impl From<BlockStatus> for BlockedResponse {
    fn from(value: BlockStatus) -> Self {
        Self {
            message: "credential is temporarily blocked".to_owned(),
            blocked_until: value.blocked_until.map(timestamp),
            hours_remaining: value.hours_remaining,
            reason: value.reason,
        }
    }
}

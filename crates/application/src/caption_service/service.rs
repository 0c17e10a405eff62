use std::sync::Arc;

use moodcap_core::{AppError, AppResult};
use moodcap_domain::{CacheKey, IdentityKey, ImageMetadata, ImageSource};
use serde::Serialize;
use tracing::{info, warn};

use crate::abuse_block_service::{AbuseBlockService, BlockStatus};
use crate::fingerprint_service::FingerprintService;
use crate::quota_service::{QuotaCheck, QuotaService};
use crate::result_cache_service::{CacheLookup, ResultCacheService};

use super::ports::CaptionGenerator;

/// One caption generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Quota identity of the caller.
    pub identity: IdentityKey,
    /// Block list credential, e.g. the account email. Defaults to the
    /// identity's storage key.
    pub credential: Option<String>,
    /// Image to caption.
    pub image: ImageSource,
    /// Optional metadata folded into the fingerprint.
    pub metadata: Option<ImageMetadata>,
    /// Free-form prompt.
    pub prompt: Option<String>,
    /// Requested mood.
    pub mood: String,
}

impl GenerationRequest {
    fn block_credential(&self) -> String {
        self.credential
            .clone()
            .unwrap_or_else(|| self.identity.storage_key())
    }
}

/// Result of the generation flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// The credential is on the block list.
    Blocked(BlockStatus),
    /// The identity has used up its quota window.
    QuotaExceeded(QuotaCheck),
    /// Captions were served.
    Generated {
        /// Caption set.
        captions: Vec<String>,
        /// Whether the captions came from the cache.
        cached: bool,
        /// Quota state after this request.
        quota: QuotaCheck,
    },
}

/// Orchestrates block list, quota, cache, and generation backend.
#[derive(Clone)]
pub struct CaptionService {
    blocks: AbuseBlockService,
    quota: QuotaService,
    cache: ResultCacheService,
    fingerprints: FingerprintService,
    generator: Arc<dyn CaptionGenerator>,
}

impl CaptionService {
    /// Creates the generation flow from its collaborators.
    #[must_use]
    pub fn new(
        blocks: AbuseBlockService,
        quota: QuotaService,
        cache: ResultCacheService,
        generator: Arc<dyn CaptionGenerator>,
    ) -> Self {
        Self {
            blocks,
            quota,
            cache,
            fingerprints: FingerprintService::new(),
            generator,
        }
    }

    /// Runs one generation request.
    ///
    /// Cache hits still count against quota. Backend failures propagate;
    /// a failing cache write is logged and the generated captions are
    /// returned anyway.
    pub async fn generate(&self, request: GenerationRequest) -> AppResult<GenerationOutcome> {
        let fingerprint = match &request.metadata {
            Some(metadata) => self
                .fingerprints
                .fingerprint_with_metadata(&request.image, metadata)?,
            None => self.fingerprints.fingerprint(&request.image)?,
        };
        let key = CacheKey::new(fingerprint, request.prompt.as_deref(), &request.mood)?;

        let block = self.blocks.is_blocked(&request.block_credential()).await?;
        if block.blocked {
            info!(identity = %request.identity, "generation rejected, credential blocked");
            return Ok(GenerationOutcome::Blocked(block));
        }

        let quota = self.quota.check_identity(&request.identity).await?;
        if !quota.allowed {
            info!(
                identity = %request.identity,
                reset_at = %quota.reset_at,
                "generation rejected, quota exhausted"
            );
            return Ok(GenerationOutcome::QuotaExceeded(quota));
        }

        if let CacheLookup::Hit(entry) = self.cache.lookup(&key).await {
            return Ok(GenerationOutcome::Generated {
                captions: entry.captions,
                cached: true,
                quota,
            });
        }

        let captions = self
            .generator
            .generate(&request.image, key.prompt(), key.mood())
            .await?;
        if captions.is_empty() {
            return Err(AppError::Unavailable(
                "generation backend returned no captions".to_owned(),
            ));
        }

        let owner_id = match &request.identity {
            IdentityKey::User(user_id) => Some(user_id.clone()),
            IdentityKey::Ip(_) => None,
        };
        let fingerprint = key.fingerprint().clone();
        if let Err(error) = self.cache.store(key, captions.clone(), owner_id).await {
            warn!(
                fingerprint = %fingerprint,
                error = %error,
                "failed to cache generated captions"
            );
        }

        Ok(GenerationOutcome::Generated {
            captions,
            cached: false,
            quota,
        })
    }
}

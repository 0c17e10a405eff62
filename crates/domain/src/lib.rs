//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod block;
mod cache;
mod image;
mod quota;

pub use block::{
    BLOCK_MAX_HOURS_LIMIT, BlockEscalation, BlockOffense, BlockRecord, Credential,
    DEFAULT_BLOCK_HOURS_PER_OFFENSE, DEFAULT_BLOCK_MAX_HOURS,
};
pub use cache::{
    CacheEntry, CacheKey, DEFAULT_PROMPT, FINGERPRINT_HEX_LENGTH, Fingerprint, normalize_mood,
    normalize_prompt,
};
pub use image::{ImageKind, ImageMetadata, ImageSource};
pub use quota::{IdentityKey, QuotaWindow};

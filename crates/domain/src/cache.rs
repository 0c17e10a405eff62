//! Result cache domain types.
//!
//! A cache entry is identified by the `(fingerprint, prompt, mood)` triple.
//! Prompts are normalised before they become part of a key: callers that omit
//! a prompt intentionally share the entry stored under [`DEFAULT_PROMPT`].

use chrono::{DateTime, Utc};
use moodcap_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prompt sentinel used when the caller supplies no prompt text.
pub const DEFAULT_PROMPT: &str = "default";

/// Length of a hex-encoded SHA-256 digest.
pub const FINGERPRINT_HEX_LENGTH: usize = 64;

/// Opaque content key derived from image bytes or an image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Creates a fingerprint from a lowercase hex SHA-256 digest.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_ascii_lowercase();

        if value.len() != FINGERPRINT_HEX_LENGTH {
            return Err(AppError::Validation(format!(
                "fingerprint must be {FINGERPRINT_HEX_LENGTH} hex characters, got {}",
                value.len()
            )));
        }

        if !value.chars().all(|character| character.is_ascii_hexdigit()) {
            return Err(AppError::Validation(
                "fingerprint must contain only hex characters".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Normalises prompt text for use in a cache key.
///
/// Leading and trailing whitespace is dropped and internal runs of whitespace
/// collapse to one space. Case is preserved. Absent or blank prompts map to
/// [`DEFAULT_PROMPT`].
#[must_use]
pub fn normalize_prompt(prompt: Option<&str>) -> String {
    let collapsed = prompt
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.is_empty() {
        DEFAULT_PROMPT.to_owned()
    } else {
        collapsed
    }
}

/// Normalises a mood tag: trimmed and lower-cased, must not be empty.
pub fn normalize_mood(mood: &str) -> AppResult<String> {
    let normalized = mood.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AppError::Validation("mood must not be empty".to_owned()));
    }

    Ok(normalized)
}

/// Unique key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    fingerprint: Fingerprint,
    prompt: String,
    mood: String,
}

impl CacheKey {
    /// Builds a key, normalising the prompt and mood.
    pub fn new(fingerprint: Fingerprint, prompt: Option<&str>, mood: &str) -> AppResult<Self> {
        Ok(Self {
            fingerprint,
            prompt: normalize_prompt(prompt),
            mood: normalize_mood(mood)?,
        })
    }

    /// Returns the content fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Returns the normalised prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        self.prompt.as_str()
    }

    /// Returns the normalised mood.
    #[must_use]
    pub fn mood(&self) -> &str {
        self.mood.as_str()
    }
}

/// Stored caption set for one `(fingerprint, prompt, mood)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Record identifier used by administrative deletes.
    pub id: Uuid,
    /// Cache key.
    pub key: CacheKey,
    /// Generated captions in backend order.
    pub captions: Vec<String>,
    /// Identity of the caller that last populated the entry.
    pub owner_id: Option<String>,
    /// Starts at 1 and grows on every hit and every re-store.
    pub usage_count: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last hit or store.
    pub last_used_at: DateTime<Utc>,
    /// Optional expiry after which the entry is swept.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Returns whether the entry expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

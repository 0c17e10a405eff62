//! Content fingerprinting for caption cache keys.
//!
//! Fingerprints are SHA-256 digests. Inline and byte inputs hash the decoded
//! image bytes, so the same picture uploaded as a data URL or as a raw buffer
//! yields the same key. References hash the reference text. No I/O happens
//! here.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{Fingerprint, ImageMetadata, ImageSource};
use sha2::{Digest, Sha256};

/// Derives stable content keys from image inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintService;

impl FingerprintService {
    /// Creates the service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the content fingerprint of an image.
    pub fn fingerprint(&self, image: &ImageSource) -> AppResult<Fingerprint> {
        let digest = match image {
            ImageSource::Inline(encoded) => sha256_hex(&decode_inline(encoded)?),
            ImageSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(AppError::Validation(
                        "image buffer must not be empty".to_owned(),
                    ));
                }
                sha256_hex(bytes)
            }
            ImageSource::Reference(reference) => {
                let reference = reference.trim();
                if reference.is_empty() {
                    return Err(AppError::Validation(
                        "image reference must not be empty".to_owned(),
                    ));
                }
                sha256_hex(reference.as_bytes())
            }
        };

        Fingerprint::new(digest)
    }

    /// Combines the content fingerprint with a canonical, key-sorted
    /// serialisation of the metadata. Absent metadata fields are omitted.
    pub fn fingerprint_with_metadata(
        &self,
        image: &ImageSource,
        metadata: &ImageMetadata,
    ) -> AppResult<Fingerprint> {
        let content = self.fingerprint(image)?;
        let canonical = canonical_metadata(metadata)?;

        let mut combined = String::with_capacity(content.as_str().len() + 1 + canonical.len());
        combined.push_str(content.as_str());
        combined.push('|');
        combined.push_str(canonical.as_str());

        Fingerprint::new(sha256_hex(combined.as_bytes()))
    }
}

fn decode_inline(encoded: &str) -> AppResult<Vec<u8>> {
    let payload = match encoded.trim().strip_prefix("data:") {
        Some(data_url) => data_url
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| {
                AppError::Validation("inline image data URL has no payload".to_owned())
            })?,
        None => encoded,
    };

    let compact: String = payload
        .chars()
        .filter(|character| !character.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(AppError::Validation(
            "inline image payload must not be empty".to_owned(),
        ));
    }

    STANDARD
        .decode(compact.as_bytes())
        .or_else(|_| STANDARD_NO_PAD.decode(compact.as_bytes()))
        .map_err(|error| AppError::Validation(format!("inline image is not valid base64: {error}")))
}

fn canonical_metadata(metadata: &ImageMetadata) -> AppResult<String> {
    let value = serde_json::to_value(metadata).map_err(|error| {
        AppError::Internal(format!("failed to serialize image metadata: {error}"))
    })?;

    let sorted: BTreeMap<String, serde_json::Value> = match value {
        serde_json::Value::Object(fields) => fields.into_iter().collect(),
        _ => BTreeMap::new(),
    };

    serde_json::to_string(&sorted).map_err(|error| {
        AppError::Internal(format!("failed to serialize image metadata: {error}"))
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();

    result
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}

#[cfg(test)]
mod tests {
    use moodcap_domain::{ImageMetadata, ImageSource};

    use super::FingerprintService;

    const PIXEL_BASE64: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mP8/x8AAwMCAO6nY9sAAAAASUVORK5CYII=";

    fn pixel_bytes() -> Vec<u8> {
        use base64::Engine;
        match base64::engine::general_purpose::STANDARD.decode(PIXEL_BASE64) {
            Ok(bytes) => bytes,
            Err(error) => panic!("fixture should decode: {error}"),
        }
    }

    #[test]
    fn identical_bytes_produce_identical_keys_across_input_forms() {
        let service = FingerprintService::new();

        let from_data_url = service.fingerprint(&ImageSource::Inline(format!(
            "data:image/png;base64,{PIXEL_BASE64}"
        )));
        let from_bare_base64 = service.fingerprint(&ImageSource::Inline(PIXEL_BASE64.to_owned()));
        let from_bytes = service.fingerprint(&ImageSource::Bytes(pixel_bytes()));

        assert!(from_data_url.is_ok());
        assert_eq!(from_data_url.as_ref().ok(), from_bare_base64.as_ref().ok());
        assert_eq!(from_data_url.as_ref().ok(), from_bytes.as_ref().ok());
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let service = FingerprintService::new();
        let image = ImageSource::Bytes(b"caption me".to_vec());

        let first = service.fingerprint(&image).ok();
        let second = service.fingerprint(&image).ok();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn known_digest_matches_sha256() {
        let service = FingerprintService::new();
        let fingerprint = service.fingerprint(&ImageSource::Bytes(b"abc".to_vec()));

        assert_eq!(
            fingerprint.ok().map(|value| value.as_str().to_owned()),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_owned())
        );
    }

    #[test]
    fn different_references_to_the_same_image_do_not_collide() {
        let service = FingerprintService::new();
        let direct = service.fingerprint(&ImageSource::Reference(
            "https://cdn.example.com/cat.png".to_owned(),
        ));
        let with_query = service.fingerprint(&ImageSource::Reference(
            "https://cdn.example.com/cat.png?v=2".to_owned(),
        ));

        assert!(direct.is_ok() && with_query.is_ok());
        assert_ne!(direct.ok(), with_query.ok());
    }

    #[test]
    fn invalid_inline_payloads_are_rejected() {
        let service = FingerprintService::new();
        assert!(
            service
                .fingerprint(&ImageSource::Inline("data:image/png;base64,".to_owned()))
                .is_err()
        );
        assert!(
            service
                .fingerprint(&ImageSource::Inline("not base64 at all!".to_owned()))
                .is_err()
        );
        assert!(service.fingerprint(&ImageSource::Bytes(Vec::new())).is_err());
    }

    #[test]
    fn metadata_tightens_identity_and_ignores_field_order() {
        let service = FingerprintService::new();
        let image = ImageSource::Bytes(pixel_bytes());

        let plain = service.fingerprint(&image).ok();
        let small = ImageMetadata {
            width: Some(1),
            height: Some(1),
            format: Some("png".to_owned()),
            ..ImageMetadata::default()
        };
        let renamed = ImageMetadata {
            name: Some("pixel.png".to_owned()),
            ..small.clone()
        };

        let with_small = service.fingerprint_with_metadata(&image, &small).ok();
        let with_small_again = service.fingerprint_with_metadata(&image, &small).ok();
        let with_renamed = service.fingerprint_with_metadata(&image, &renamed).ok();

        assert!(with_small.is_some());
        assert_eq!(with_small, with_small_again);
        assert_ne!(with_small, plain);
        assert_ne!(with_small, with_renamed);
    }
}

//! Image inputs accepted by the fingerprinting service.

use serde::{Deserialize, Serialize};

/// An image as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64 text, optionally carrying a `data:<media-type>;base64,` prefix.
    Inline(String),
    /// Raw image bytes.
    Bytes(Vec<u8>),
    /// Remote URL or content-store identifier. The reference text itself is
    /// hashed, so two references to the same image do not collide.
    Reference(String),
}

/// How the caller says `image` should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    /// Base64 text or a data URL.
    Inline,
    /// URL or content-store identifier.
    Reference,
}

impl ImageSource {
    /// Builds a source of the declared kind.
    #[must_use]
    pub fn with_kind(value: impl Into<String>, kind: ImageKind) -> Self {
        let value = value.into().trim().to_owned();
        match kind {
            ImageKind::Inline => Self::Inline(value),
            ImageKind::Reference => Self::Reference(value),
        }
    }

    /// Classifies caller text without a declared kind.
    ///
    /// Data URLs and text that is well-formed standard base64 are inline.
    /// `http(s)` URLs and everything else, such as `uploads/2026/cat.png`,
    /// are references.
    #[must_use]
    pub fn from_text(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.starts_with("data:") {
            return Self::Inline(trimmed.to_owned());
        }

        if !trimmed.starts_with("http://")
            && !trimmed.starts_with("https://")
            && is_standard_base64(trimmed)
        {
            return Self::Inline(trimmed.to_owned());
        }

        Self::Reference(trimmed.to_owned())
    }
}

/// Standard alphabet, at most two trailing `=`, and a length that decodes
/// to whole bytes. ASCII whitespace is ignored.
fn is_standard_base64(text: &str) -> bool {
    let compact: Vec<u8> = text
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    let body_length = compact
        .iter()
        .rposition(|byte| *byte != b'=')
        .map_or(0, |last| last + 1);
    let padding = compact.len() - body_length;

    if body_length == 0 || padding > 2 {
        return false;
    }

    let alphabet_only = compact[..body_length]
        .iter()
        .all(|byte| byte.is_ascii_alphanumeric() || *byte == b'+' || *byte == b'/');
    if !alphabet_only {
        return false;
    }

    if padding > 0 {
        compact.len() % 4 == 0
    } else {
        body_length % 4 != 1
    }
}

/// Optional descriptive metadata that can tighten image identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Pixel width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Payload size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Format hint such as `png`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{ImageKind, ImageSource};

    #[test]
    fn data_urls_are_inline() {
        assert!(matches!(
            ImageSource::from_text("data:image/png;base64,iVBORw0KGgo="),
            ImageSource::Inline(_)
        ));
    }

    #[test]
    fn urls_and_identifiers_are_references() {
        for reference in [
            "https://cdn.example.com/cat.png",
            "img_01HZX3",
            "uploads/2026/cat.png",
            "bucket/objects/7f3a-91c2",
        ] {
            assert_eq!(
                ImageSource::from_text(reference),
                ImageSource::Reference(reference.to_owned()),
                "{reference} should be a reference"
            );
        }
    }

    #[test]
    fn bare_base64_is_inline_whatever_its_length() {
        let long = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mP8/x8AAwMCAO6nY9sAAAAASUVORK5CYII=";
        for payload in [long, "iVBORw0KGgo=", "iVBORw0KGgo"] {
            assert_eq!(
                ImageSource::from_text(payload),
                ImageSource::Inline(payload.to_owned()),
                "{payload} should be inline"
            );
        }
    }

    #[test]
    fn malformed_padding_is_not_base64() {
        assert!(matches!(
            ImageSource::from_text("abc==="),
            ImageSource::Reference(_)
        ));
        assert!(matches!(
            ImageSource::from_text("abcde"),
            ImageSource::Reference(_)
        ));
    }

    #[test]
    fn declared_kind_overrides_classification() {
        assert_eq!(
            ImageSource::with_kind(" abcd1234 ", ImageKind::Reference),
            ImageSource::Reference("abcd1234".to_owned())
        );
        assert_eq!(
            ImageSource::with_kind("uploads/cat.png", ImageKind::Inline),
            ImageSource::Inline("uploads/cat.png".to_owned())
        );
    }
}

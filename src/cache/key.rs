//! Cache key generation.

use crate::fingerprint::{fingerprint, Fingerprint};
use crate::types::{AnalysisParams, AnalysisVariant, ContentItem};
use serde::{Deserialize, Serialize};

/// Address of one analysis result: content fingerprint, variant and the digest
/// of the canonical personalization parameters.
///
/// Two keys may share a fingerprint only when their variant or parameter set
/// differs. The unprefixed [`CacheKey::request_key`] is the durable store's
/// unique identity; the fast cache adds a namespace prefix on top.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub fingerprint: Fingerprint,
    pub variant: AnalysisVariant,
    pub params_digest: String,
}

impl CacheKey {
    pub fn new(fingerprint: Fingerprint, params: &AnalysisParams) -> Self {
        Self {
            fingerprint,
            variant: params.variant,
            params_digest: params.digest(),
        }
    }

    /// Fingerprint the items and derive the key in one step.
    pub fn for_request(items: &[ContentItem], params: &AnalysisParams) -> Self {
        Self::new(fingerprint(items), params)
    }

    /// `{fingerprint}:{variant}:{params_digest}`
    pub fn request_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.fingerprint.to_hex(),
            self.variant.as_str(),
            self.params_digest
        )
    }

    /// `{prefix}:{request_key}`, or the bare request key for an empty prefix.
    pub fn prefixed(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.request_key()
        } else {
            format!("{}:{}", prefix, self.request_key())
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.request_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PARAMS_DIGEST;

    fn items(parts: &[&[u8]]) -> Vec<ContentItem> {
        parts
            .iter()
            .map(|p| ContentItem::new(p.to_vec(), "image/png"))
            .collect()
    }

    #[test]
    fn test_default_params_key_layout() {
        let key = CacheKey::for_request(&items(&[b"A", b"B"]), &AnalysisParams::default());
        let rendered = key.request_key();
        let parts: Vec<&str> = rendered.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], key.fingerprint.to_hex());
        assert_eq!(parts[1], "complete");
        assert_eq!(parts[2], DEFAULT_PARAMS_DIGEST);
    }

    #[test]
    fn test_same_fingerprint_distinct_params() {
        let content = items(&[b"A", b"B"]);
        let vegan = CacheKey::for_request(&content, &AnalysisParams::default().with("diet", "vegan"));
        let keto = CacheKey::for_request(&content, &AnalysisParams::default().with("diet", "keto"));
        assert_eq!(vegan.fingerprint, keto.fingerprint);
        assert_ne!(vegan, keto);
        assert_ne!(vegan.request_key(), keto.request_key());
    }

    #[test]
    fn test_variant_distinguishes_keys() {
        let content = items(&[b"A"]);
        let complete = CacheKey::for_request(&content, &AnalysisParams::new(AnalysisVariant::Complete));
        let nutrition = CacheKey::for_request(&content, &AnalysisParams::new(AnalysisVariant::Nutrition));
        assert_ne!(complete.request_key(), nutrition.request_key());
    }

    #[test]
    fn test_prefixed() {
        let key = CacheKey::for_request(&items(&[b"A"]), &AnalysisParams::default());
        assert!(key.prefixed("vitai:cache:v1").starts_with("vitai:cache:v1:"));
        assert_eq!(key.prefixed(""), key.request_key());
    }
}

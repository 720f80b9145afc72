//! Analysis variant and personalization parameters.

use crate::fingerprint::hex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Digest used when a request carries no personalization.
pub const DEFAULT_PARAMS_DIGEST: &str = "default";

pub const PARAM_DIETARY_PREFERENCES: &str = "dietary_preferences";
pub const PARAM_HEALTH_CONDITIONS: &str = "health_conditions";
pub const PARAM_USER_PROFILE: &str = "user_profile";
pub const PARAM_CONTENT_LANGUAGE: &str = "content_language";

/// Kind of analysis requested; also the record's classification tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisVariant {
    #[default]
    Complete,
    Nutrition,
    Ingredients,
}

impl AnalysisVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisVariant::Complete => "complete",
            AnalysisVariant::Nutrition => "nutrition",
            AnalysisVariant::Ingredients => "ingredients",
        }
    }
}

impl fmt::Display for AnalysisVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisVariant {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(AnalysisVariant::Complete),
            "nutrition" => Ok(AnalysisVariant::Nutrition),
            "ingredients" => Ok(AnalysisVariant::Ingredients),
            other => Err(crate::Error::configuration_with_context(
                format!("unknown analysis variant '{}'", other),
                crate::ErrorContext::new().with_field_path("analysis_type"),
            )),
        }
    }
}

/// Request parameters: the variant plus an optional personalization map.
///
/// The personalization map is canonicalized for hashing (sorted keys at every
/// level), so two parameter sets that differ only in insertion order digest
/// identically. List-valued preferences are sorted and de-duplicated on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    #[serde(default)]
    pub variant: AnalysisVariant,
    #[serde(default)]
    pub personalization: BTreeMap<String, Value>,
}

impl AnalysisParams {
    pub fn new(variant: AnalysisVariant) -> Self {
        Self {
            variant,
            personalization: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.personalization.insert(key.into(), value.into());
        self
    }

    /// Insert an order-insensitive list (sorted, de-duplicated, blanks dropped).
    pub fn with_list<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        items.sort();
        items.dedup();
        if !items.is_empty() {
            self.personalization
                .insert(key.into(), Value::Array(items.into_iter().map(Value::String).collect()));
        }
        self
    }

    pub fn with_dietary_preferences<I, S>(self, prefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_list(PARAM_DIETARY_PREFERENCES, prefs)
    }

    pub fn with_health_conditions<I, S>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_list(PARAM_HEALTH_CONDITIONS, conditions)
    }

    pub fn with_user_profile(self, profile: Value) -> Self {
        self.with(PARAM_USER_PROFILE, profile)
    }

    pub fn with_language(self, language: impl Into<String>) -> Self {
        self.with(PARAM_CONTENT_LANGUAGE, Value::String(language.into()))
    }

    pub fn language(&self) -> Option<&str> {
        self.personalization
            .get(PARAM_CONTENT_LANGUAGE)
            .and_then(Value::as_str)
    }

    pub fn is_personalized(&self) -> bool {
        !self.personalization.is_empty()
    }

    /// Canonical JSON of the personalization map (recursively sorted keys).
    pub fn canonical_json(&self) -> String {
        let canonical: BTreeMap<&String, Value> = self
            .personalization
            .iter()
            .map(|(k, v)| (k, canonicalize(v)))
            .collect();
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// SHA-256 hex of the canonical parameter set, or `default` when empty.
    pub fn digest(&self) -> String {
        if self.personalization.is_empty() {
            return DEFAULT_PARAMS_DIGEST.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        hex(&hasher.finalize())
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_params_digest_is_default() {
        assert_eq!(AnalysisParams::default().digest(), DEFAULT_PARAMS_DIGEST);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = AnalysisParams::default()
            .with("diet", "vegan")
            .with("age", 31)
            .with_user_profile(json!({"weight": 70, "height": 180}));
        let b = AnalysisParams::default()
            .with_user_profile(json!({"height": 180, "weight": 70}))
            .with("age", 31)
            .with("diet", "vegan");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn test_list_preferences_are_order_insensitive() {
        let a = AnalysisParams::default().with_dietary_preferences(["vegan", "gluten-free"]);
        let b = AnalysisParams::default().with_dietary_preferences(["gluten-free", "vegan", "vegan"]);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_distinct_params_distinct_digest() {
        let vegan = AnalysisParams::default().with("diet", "vegan");
        let keto = AnalysisParams::default().with("diet", "keto");
        assert_ne!(vegan.digest(), keto.digest());
        assert_eq!(vegan.digest().len(), 64);
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("Nutrition".parse::<AnalysisVariant>().unwrap(), AnalysisVariant::Nutrition);
        assert!("weird".parse::<AnalysisVariant>().is_err());
        assert_eq!(AnalysisVariant::default().as_str(), "complete");
    }

    #[test]
    fn test_language_accessor() {
        let p = AnalysisParams::default().with_language("en");
        assert_eq!(p.language(), Some("en"));
        assert!(p.is_personalized());
    }
}

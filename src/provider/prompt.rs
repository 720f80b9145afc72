//! Prompt assembly.

use crate::types::{
    AnalysisParams, AnalysisVariant, PARAM_DIETARY_PREFERENCES, PARAM_HEALTH_CONDITIONS,
    PARAM_USER_PROFILE,
};
use serde_json::Value;

/// Used when no prompt version is active for the requested language.
pub const DEFAULT_BASE_PROMPT: &str = "\
You are analyzing photos of a packaged food product (front label, nutrition facts table, ingredient list).

Extract what is visible and evaluate it. Respond with a single JSON object using these keys:
- product: {name, brand, serving_size, servings_per_container}
- ingredients: list of ingredient names in label order
- allergens: list of identified allergens
- additives: {sweeteners, colorants, preservatives, flavorings}
- nutritional_information: object keyed by portion basis (per_serving, per_100g), each with
  calories, total_fat, saturated_fat, trans_fat, total_carbohydrates, fiber, total_sugars,
  added_sugars, protein, sodium
- classification: {processing_level (NOVA 1-4), food_category, risk_category}
- general_rating: {score (0-10), justification, score_breakdown}
- profile_ratings: object keyed by health profile, each {score, justification, recommended_frequency, suggested_serving_size}
- nutritional_evaluation: {strengths, weaknesses, warnings, reference_comparison}
- recommendations: {general_consumption, optimal_frequency, suggested_alternatives}
- executive_summary: short paragraph
- confidence_score: number between 0 and 1

Use null for values that cannot be read from the images. Do not invent data.";

/// Composes the final prompt from the configured base text and the request
/// parameters.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    base: String,
}

impl PromptBuilder {
    /// `base` is the active prompt content, if any is configured.
    pub fn new(base: Option<String>) -> Self {
        Self {
            base: base
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_PROMPT.to_string()),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn build(&self, params: &AnalysisParams, language: &str) -> String {
        let mut prompt = String::with_capacity(self.base.len() + 512);
        prompt.push_str(self.base.trim());
        prompt.push_str("\n\n");
        prompt.push_str(focus_line(params.variant));
        prompt.push('\n');
        prompt.push_str(&personalization_section(params));
        prompt.push_str(&format!(
            "\n\nIMPORTANT: Write ALL text content (justifications, summaries, \
             recommendations, warnings, strengths, weaknesses) in {}.",
            language_name(language)
        ));
        prompt.trim().to_string()
    }
}

fn focus_line(variant: AnalysisVariant) -> &'static str {
    match variant {
        AnalysisVariant::Nutrition => {
            "Analysis focus: Prioritize extraction of nutritional data and per-serving values."
        }
        AnalysisVariant::Ingredients => {
            "Analysis focus: Prioritize ingredient list, allergens, and additives."
        }
        AnalysisVariant::Complete => {
            "Analysis focus: Provide a complete analysis: nutrition, ingredients, and comprehensive health evaluation."
        }
    }
}

fn personalization_section(params: &AnalysisParams) -> String {
    let p = &params.personalization;
    let prefs = joined_list(p.get(PARAM_DIETARY_PREFERENCES));
    let conditions = joined_list(p.get(PARAM_HEALTH_CONDITIONS));
    let profile = p.get(PARAM_USER_PROFILE).filter(|v| !v.is_null());

    if prefs.is_none() && conditions.is_none() && profile.is_none() {
        return String::new();
    }
    let mut out = String::from("\n\n## Personalization\n");
    if let Some(prefs) = prefs {
        out.push_str(&format!("- Dietary preferences: {}\n", prefs));
    }
    if let Some(conditions) = conditions {
        out.push_str(&format!("- Health conditions to consider: {}\n", conditions));
    }
    if let Some(profile) = profile {
        out.push_str(&format!("- User profile: {}\n", profile));
    }
    out
}

fn joined_list(value: Option<&Value>) -> Option<String> {
    let items: Vec<&str> = match value? {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => vec![s.as_str()],
        _ => return None,
    };
    if items.is_empty() {
        None
    } else {
        Some(items.join(", "))
    }
}

/// Display name for a content-language code; unknown codes pass through.
pub fn language_name(code: &str) -> &str {
    match code {
        "es" => "Spanish",
        "en" => "English",
        other => other,
    }
}

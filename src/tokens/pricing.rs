//! Model pricing and cost calculation.

use super::TokenUsage;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub currency: String,
}

impl ModelPricing {
    pub fn new(model: &str, input: f64, output: f64) -> Self {
        Self {
            model: model.into(),
            input_cost_per_1k: input,
            output_cost_per_1k: output,
            currency: "USD".into(),
        }
    }
    pub fn calculate_cost(&self, usage: &TokenUsage) -> CostEstimate {
        let ic = (usage.prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let oc = (usage.completion_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        CostEstimate {
            model: self.model.clone(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            input_cost: ic,
            output_cost: oc,
            total_cost: ic + oc,
            currency: self.currency.clone(),
        }
    }
    pub fn gpt_51_chat_latest() -> Self {
        Self::new("gpt-5.1-chat-latest", 0.01, 0.03)
    }
    pub fn gpt_4o() -> Self {
        Self::new("gpt-4o", 0.0025, 0.01)
    }
    pub fn gpt_4o_mini() -> Self {
        Self::new("gpt-4o-mini", 0.00015, 0.0006)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl CostEstimate {
    pub fn format(&self) -> String {
        format!("{} {:.6}", self.currency, self.total_cost)
    }
}

/// Rates keyed by lowercase model identifier.
///
/// Lookup is exact (after lowercasing): a dated snapshot such as
/// `gpt-4o-2024-08-06` needs its own entry.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

static DEFAULT_TABLE: Lazy<PricingTable> = Lazy::new(|| {
    PricingTable::empty()
        .with(ModelPricing::gpt_51_chat_latest())
        .with(ModelPricing::gpt_4o())
        .with(ModelPricing::gpt_4o_mini())
});

impl PricingTable {
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    pub fn with(mut self, pricing: ModelPricing) -> Self {
        self.insert(pricing);
        self
    }

    pub fn insert(&mut self, pricing: ModelPricing) {
        self.models.insert(pricing.model.to_lowercase(), pricing);
    }

    /// Exact match first, then the longest known model id that prefixes
    /// `model` at a `-` boundary (`gpt-4o-2024-08-06` prices as `gpt-4o`).
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        let model = model.trim().to_lowercase();
        if let Some(p) = self.models.get(&model) {
            return Some(p);
        }
        self.models
            .iter()
            .filter(|(id, _)| {
                model.len() > id.len() && model.starts_with(id.as_str()) && model.as_bytes()[id.len()] == b'-'
            })
            .max_by_key(|(id, _)| id.len())
            .map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Cost in USD. Unknown models cost 0.0 and log a warning; cost is
    /// observability data, so a missing rate never fails a request.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        match self.get(model) {
            Some(p) => p.calculate_cost(usage).total_cost,
            None => {
                warn!(model = model, "no pricing data for model, recording zero cost");
                0.0
            }
        }
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage::new(prompt, completion)
    }

    #[test]
    fn test_default_table_rates() {
        let table = PricingTable::default();
        assert_eq!(table.len(), 3);
        let cost = table.cost("gpt-5.1-chat-latest", &usage(1000, 1000));
        assert!((cost - 0.04).abs() < 1e-12);
        let cost = table.cost("gpt-4o", &usage(2000, 500));
        assert!((cost - (0.005 + 0.005)).abs() < 1e-12);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = PricingTable::default();
        assert!(table.get("GPT-4o").is_some());
        assert_eq!(table.get("gpt-4o-mini").map(|p| p.model.as_str()), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_dated_snapshot_prices_as_base_model() {
        let table = PricingTable::default();
        assert_eq!(table.get("gpt-4o-2024-08-06").map(|p| p.model.as_str()), Some("gpt-4o"));
        assert_eq!(
            table.get("gpt-4o-mini-2024-07-18").map(|p| p.model.as_str()),
            Some("gpt-4o-mini")
        );
        assert!(table.get("gpt-4oo").is_none());
        assert!(table.get("gpt-4").is_none());
        let cost = table.cost("gpt-4o-2024-08-06", &usage(2000, 500));
        assert!((cost - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_model_costs_zero() {
        let table = PricingTable::default();
        assert_eq!(table.cost("mystery-model", &usage(10_000, 10_000)), 0.0);
    }

    #[test]
    fn test_custom_entry() {
        let table = PricingTable::empty().with(ModelPricing::new("Local-Llm", 0.0, 0.0));
        assert!(table.get("local-llm").is_some());
        let estimate = ModelPricing::gpt_4o_mini().calculate_cost(&usage(1000, 0));
        assert_eq!(estimate.format(), "USD 0.000150");
    }
}

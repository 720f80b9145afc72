//! Token 用量与成本计算模块：按模型费率将 Token 数换算为美元成本。
//!
//! # Token Usage and Cost Module
//!
//! Providers report token counts per call; this module turns them into a USD
//! cost using per-model rates. Cost is observability data, so an unknown model
//! yields zero cost with a warning rather than an error.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenUsage`] | Prompt / completion / total token counts |
//! | [`ModelPricing`] | Per-1K-token rates for one model |
//! | [`PricingTable`] | Case-insensitive model lookup with built-in defaults |
//! | [`CostEstimate`] | Cost breakdown for one call |
//!
//! ## Example
//!
//! ```rust
//! use ai_analysis_core::tokens::{PricingTable, TokenUsage};
//!
//! let table = PricingTable::default();
//! let cost = table.cost("gpt-4o-mini", &TokenUsage::new(1200, 300));
//! assert!(cost > 0.0);
//! ```

mod pricing;

use serde::{Deserialize, Serialize};

pub use pricing::{CostEstimate, ModelPricing, PricingTable};

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Use the provider's reported total when it differs from the sum
    /// (reasoning tokens are billed but not listed separately).
    pub fn with_total(mut self, total_tokens: u64) -> Self {
        self.total_tokens = total_tokens.max(self.prompt_tokens.saturating_add(self.completion_tokens));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_sum() {
        let usage = TokenUsage::new(1200, 300);
        assert_eq!(usage.total_tokens, 1500);
        assert_eq!(usage.with_total(1700).total_tokens, 1700);
        assert_eq!(usage.with_total(10).total_tokens, 1500);
    }

    #[test]
    fn test_total_saturates_on_overflow() {
        let usage = TokenUsage::new(u64::MAX, 5);
        assert_eq!(usage.total_tokens, u64::MAX);
        assert_eq!(usage.with_total(0).total_tokens, u64::MAX);
    }
}

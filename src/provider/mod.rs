//! 分析提供方抽象层：通过 trait 对外部 AI 分析服务进行动态分发
//!
//! Analysis provider abstraction. The orchestrator only sees
//! [`AnalysisProvider`]; [`OpenAiProvider`] is the production implementation
//! over the OpenAI Responses API, and tests plug in scripted doubles.

pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use serde_json::Value;

use crate::tokens::TokenUsage;
use crate::types::ContentItem;

pub use openai::{OpenAiConfig, OpenAiProvider};
pub use prompt::{PromptBuilder, DEFAULT_BASE_PROMPT};

/// Raw provider result, before validation into a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    /// Parsed JSON payload as returned by the model.
    pub payload: Value,
    pub usage: TokenUsage,
    /// Model that served the call; used for pricing.
    pub model: String,
}

/// External analysis service.
///
/// Implementations fail with [`crate::Error::Provider`] on transport failure,
/// non-success status, or empty/unparsable output. Timeouts are applied by the
/// caller.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, items: &[ContentItem], prompt: &str) -> crate::Result<ProviderOutput>;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    fn name(&self) -> &'static str;
}

//! OpenAI Responses API provider.

use super::{AnalysisProvider, ProviderOutput};
use crate::tokens::TokenUsage;
use crate::types::ContentItem;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const SYSTEM_INSTRUCTIONS: &str = "You are an expert nutritional analyst. \
You must follow exactly the steps and rules in the prompt. \
Do not ignore any scoring coherence conditions. \
If the general_rating score is less than 5, no individual profile score can be greater than 7. \
Return ONLY valid JSON, with no additional text or explanation outside the JSON.";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5.1-chat-latest";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    /// HTTP-level timeout; the orchestrator applies its own bound on top.
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 4000,
            timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &self.config.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, items: &[ContentItem], prompt: &str) -> Value {
        let mut user_content = vec![json!({"type": "input_text", "text": prompt})];
        user_content.extend(
            items
                .iter()
                .map(|item| json!({"type": "input_image", "image_url": item.data_url()})),
        );
        json!({
            "model": self.config.model,
            "input": [
                {
                    "role": "system",
                    "content": [{"type": "input_text", "text": SYSTEM_INSTRUCTIONS}]
                },
                {"role": "user", "content": user_content}
            ],
            "max_output_tokens": self.config.max_output_tokens,
            "text": {"format": {"type": "json_object"}}
        })
    }
}

fn provider_error(msg: impl Into<String>, details: Option<String>) -> Error {
    let mut ctx = ErrorContext::new().with_source("openai_provider");
    if let Some(d) = details {
        ctx = ctx.with_details(d);
    }
    Error::provider_with_context(msg, ctx)
}

/// Concatenated `output_text` parts of a Responses API body.
pub(crate) fn extract_output_text(body: &Value) -> Option<String> {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.to_string());
        }
    }
    let mut out = String::new();
    for item in body.get("output").and_then(Value::as_array).into_iter().flatten() {
        for part in item.get("content").and_then(Value::as_array).into_iter().flatten() {
            if part.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }
    }
    if out.trim().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Remove a ```json ... ``` wrapper if the model added one.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```")) else {
        return trimmed;
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_usage(body: &Value) -> TokenUsage {
    let usage = match body.get("usage") {
        Some(u) => u,
        None => return TokenUsage::default(),
    };
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
    TokenUsage::new(field("input_tokens"), field("output_tokens")).with_total(field("total_tokens"))
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
    async fn analyze(&self, items: &[ContentItem], prompt: &str) -> Result<ProviderOutput> {
        let body = self.request_body(items, prompt);
        info!(model = %self.config.model, images = items.len(), "calling OpenAI Responses API");

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| provider_error("OpenAI request failed", Some(e.to_string())))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| provider_error("failed to read OpenAI response", Some(e.to_string())))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| text.chars().take(500).collect());
            return Err(provider_error(
                format!("OpenAI returned HTTP {}", status.as_u16()),
                Some(message),
            ));
        }

        let response: Value = serde_json::from_str(&text)
            .map_err(|e| provider_error("OpenAI response is not JSON", Some(e.to_string())))?;

        if response.get("status").and_then(Value::as_str) == Some("incomplete") {
            warn!(
                reason = ?response.pointer("/incomplete_details/reason"),
                "OpenAI response incomplete"
            );
        }

        let content = extract_output_text(&response)
            .ok_or_else(|| provider_error("empty response from OpenAI", None))?;
        debug!(len = content.len(), "raw OpenAI output received");

        let payload: Value = serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            warn!(error = %e, len = content.len(), "OpenAI output is not valid JSON");
            provider_error(
                "invalid JSON response from OpenAI",
                Some(format!("{} (line {}, column {})", e, e.line(), e.column())),
            )
        })?;

        let usage = extract_usage(&response);
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "OpenAI token usage"
        );

        // Responses echo a dated snapshot id; billing follows the configured model.
        if let Some(snapshot) = response.get("model").and_then(Value::as_str) {
            debug!(configured = %self.config.model, snapshot = snapshot, "OpenAI model snapshot");
        }

        Ok(ProviderOutput {
            payload,
            usage,
            model: self.config.model.clone(),
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_extract_output_text_from_output_items() {
        let body = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"a\":"},
                    {"type": "output_text", "text": "1}"}
                ]}
            ]
        });
        assert_eq!(extract_output_text(&body).as_deref(), Some("{\"a\":1}"));
        assert_eq!(extract_output_text(&json!({"output": []})), None);
    }

    #[test]
    fn test_extract_usage() {
        let body = json!({"usage": {"input_tokens": 1200, "output_tokens": 300, "total_tokens": 1550}});
        let usage = extract_usage(&body);
        assert_eq!(usage.prompt_tokens, 1200);
        assert_eq!(usage.completion_tokens, 300);
        assert_eq!(usage.total_tokens, 1550);
        assert_eq!(extract_usage(&json!({})), TokenUsage::default());
    }

    #[test]
    fn test_request_body_shape() {
        let provider = OpenAiProvider::new(OpenAiConfig::default()).unwrap();
        let items = vec![ContentItem::new(vec![1u8, 2, 3], "image/png")];
        let body = provider.request_body(&items, "analyze");
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["text"]["format"]["type"], "json_object");
        let user = &body["input"][1]["content"];
        assert_eq!(user[0]["text"], "analyze");
        assert_eq!(user[1]["image_url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiProvider::new(OpenAiConfig::default().with_api_key("sk-secret")).unwrap();
        let rendered = format!("{:?}", provider);
        assert!(!rendered.contains("sk-secret"));
    }
}

//! Runtime settings.
//!
//! Loaded from YAML and/or the process environment. Environment variable names
//! are shared with the service deployment (`REDIS_URL`, `OPENAI_MODEL`, ...).
//! An unparsable numeric or boolean variable is ignored with a warning and the
//! previous value is kept.

use crate::cache::FastCacheConfig;
use crate::provider::openai::{OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::resilience::CircuitBreakerConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fast_cache: FastCacheSettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub config_cache: ConfigCacheSettings,
    pub provider: ProviderSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastCacheSettings {
    pub enabled: bool,
    pub url: String,
    pub ttl_secs: u64,
    pub timeout_ms: u64,
    pub key_prefix: String,
    pub max_entry_bytes: usize,
}

impl Default for FastCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379".to_string(),
            ttl_secs: 86_400,
            timeout_ms: 2_000,
            key_prefix: "vitai:cache:v1".to_string(),
            max_entry_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigCacheSettings {
    pub ttl_secs: u64,
    /// Language whose active prompt is used when a request names none.
    pub prompt_language: String,
}

impl Default for ConfigCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            prompt_language: "es".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 60,
            max_output_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub database_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            timeout_ms: 5_000,
        }
    }
}

impl Settings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid settings: {}", e),
                ErrorContext::new().with_source("settings"),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_details(path.display().to_string()),
            },
            other => other,
        })
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env(|k| std::env::var(k).ok());
        settings
    }

    /// Overlay values found through `lookup` (an env-like key lookup).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("REDIS_URL") {
            self.fast_cache.url = v;
        }
        if let Some(v) = get("REDIS_ENABLED") {
            match parse_bool(&v) {
                Some(b) => self.fast_cache.enabled = b,
                None => warn!(key = "REDIS_ENABLED", value = %v, "ignoring invalid boolean"),
            }
        }
        set_parsed(&mut self.fast_cache.ttl_secs, "REDIS_CACHE_TTL", get("REDIS_CACHE_TTL"));
        if let Some(v) = get("REDIS_SOCKET_TIMEOUT") {
            // seconds, fractional allowed
            match v.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    self.fast_cache.timeout_ms = (secs * 1000.0).round() as u64;
                }
                _ => warn!(key = "REDIS_SOCKET_TIMEOUT", value = %v, "ignoring invalid timeout"),
            }
        }
        set_parsed(
            &mut self.circuit_breaker.failure_threshold,
            "REDIS_CIRCUIT_BREAKER_THRESHOLD",
            get("REDIS_CIRCUIT_BREAKER_THRESHOLD"),
        );
        let mut recovery_secs = self.circuit_breaker.recovery_timeout.as_secs();
        set_parsed(
            &mut recovery_secs,
            "REDIS_CIRCUIT_BREAKER_TIMEOUT",
            get("REDIS_CIRCUIT_BREAKER_TIMEOUT"),
        );
        self.circuit_breaker.recovery_timeout = Duration::from_secs(recovery_secs);

        if let Some(v) = get("OPENAI_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = get("OPEN_AI_KEY") {
            self.provider.api_key = Some(v);
        }
        set_parsed(
            &mut self.provider.max_output_tokens,
            "OPENAI_MAX_OUTPUT_TOKENS",
            get("OPENAI_MAX_OUTPUT_TOKENS"),
        );
        set_parsed(&mut self.provider.timeout_secs, "OPENAI_TIMEOUT_SECS", get("OPENAI_TIMEOUT_SECS"));

        if let Some(v) = get("DATABASE_URL") {
            self.store.database_url = Some(v);
        }
        if let Some(v) = get("PROMPT_LANGUAGE") {
            self.config_cache.prompt_language = v;
        }
        set_parsed(&mut self.config_cache.ttl_secs, "PROMPT_TTL_SECS", get("PROMPT_TTL_SECS"));
    }

    pub fn fast_cache_config(&self) -> FastCacheConfig {
        FastCacheConfig {
            enabled: self.fast_cache.enabled,
            default_ttl: Duration::from_secs(self.fast_cache.ttl_secs.max(1)),
            op_timeout: Duration::from_millis(self.fast_cache.timeout_ms.max(1)),
            max_entry_size: self.fast_cache.max_entry_bytes,
            key_prefix: self.fast_cache.key_prefix.clone(),
        }
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.provider.api_key.clone(),
            base_url: self.provider.base_url.clone(),
            model: self.provider.model.clone(),
            max_output_tokens: self.provider.max_output_tokens,
            timeout: self.provider_timeout(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs.max(1))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms.max(1))
    }

    pub fn config_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache.ttl_secs)
    }
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, value: Option<String>) {
    if let Some(v) = value {
        match v.parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(key = key, value = %v, "ignoring invalid numeric setting"),
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

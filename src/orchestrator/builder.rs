use super::{AnalysisOrchestrator, WriteThrough};
use crate::cache::FastCacheClient;
use crate::config::Settings;
use crate::config_cache::ConfigCache;
use crate::provider::AnalysisProvider;
use crate::store::AnalysisStore;
use crate::telemetry::{MetricsSink, NoopMetricsSink};
use crate::tokens::PricingTable;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`AnalysisOrchestrator`].
///
/// Store and provider are required. Without a fast cache the orchestrator runs
/// on the durable path alone; without a config cache every request uses the
/// built-in prompt.
pub struct AnalysisOrchestratorBuilder {
    store: Option<Arc<dyn AnalysisStore>>,
    provider: Option<Arc<dyn AnalysisProvider>>,
    fast_cache: Option<Arc<FastCacheClient>>,
    config_cache: Option<Arc<ConfigCache>>,
    pricing: PricingTable,
    metrics: Arc<dyn MetricsSink>,
    store_timeout: Duration,
    provider_timeout: Duration,
    default_language: String,
}

impl AnalysisOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            provider: None,
            fast_cache: None,
            config_cache: None,
            pricing: PricingTable::default(),
            metrics: Arc::new(NoopMetricsSink),
            store_timeout: Duration::from_secs(5),
            provider_timeout: Duration::from_secs(60),
            default_language: "es".to_string(),
        }
    }

    /// Take timeouts and the default prompt language from settings.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.store_timeout = settings.store_timeout();
        self.provider_timeout = settings.provider_timeout();
        self.default_language = settings.config_cache.prompt_language.clone();
        self
    }

    pub fn store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn fast_cache(mut self, cache: Arc<FastCacheClient>) -> Self {
        self.fast_cache = Some(cache);
        self
    }

    pub fn config_cache(mut self, cache: Arc<ConfigCache>) -> Self {
        self.config_cache = Some(cache);
        self
    }

    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Inject a metrics sink. Default is a no-op sink.
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Prompt language for requests that do not set `content_language`.
    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn build(self) -> Result<AnalysisOrchestrator> {
        let store = self.store.ok_or_else(|| missing("store"))?;
        let provider = self.provider.ok_or_else(|| missing("provider"))?;
        if self.store_timeout.is_zero() || self.provider_timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "timeouts must be non-zero",
                ErrorContext::new().with_source("orchestrator_builder"),
            ));
        }
        let fast_cache = self
            .fast_cache
            .unwrap_or_else(|| Arc::new(FastCacheClient::disabled()));
        Ok(AnalysisOrchestrator {
            store,
            provider,
            write_through: WriteThrough::new(Arc::clone(&fast_cache)),
            fast_cache,
            config_cache: self.config_cache,
            pricing: Arc::new(self.pricing),
            metrics: self.metrics,
            store_timeout: self.store_timeout,
            provider_timeout: self.provider_timeout,
            default_language: self.default_language,
        })
    }
}

impl Default for AnalysisOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(component: &str) -> Error {
    Error::configuration_with_context(
        format!("orchestrator requires a {}", component),
        ErrorContext::new()
            .with_field_path(component)
            .with_source("orchestrator_builder"),
    )
}

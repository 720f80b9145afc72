//! 分析编排模块：指纹计算、持久化去重、快速缓存与提供方调用的完整流程。
//!
//! # Analysis Orchestrator Module
//!
//! [`AnalysisOrchestrator::analyze_or_get_cached`] resolves one request along
//! the cheapest path that yields a correct answer:
//!
//! 1. fingerprint the content and derive the request key
//! 2. durable lookup (hit: return, `cache_hit = true`)
//! 3. fast-cache lookup (hit: persist if missing, return)
//! 4. fetch the prompt through the config cache
//! 5. call the provider and validate its output
//! 6. persist; on conflict re-read and return the winner's record
//! 7. write-through to the fast cache on a detached task
//! 8. emit exactly one [`UsageMetric`]
//!
//! Only provider failures, validation failures and an unresolvable persist
//! conflict end a call with an error. Store and cache failures are logged and
//! absorbed. A fast-cache entry is only persisted once its payload decodes as
//! a report; anything else is a miss. Prompt lookups and metric writes share
//! the store timeout.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AnalysisOrchestrator`] | Request flow over injected collaborators |
//! | [`AnalysisOrchestratorBuilder`] | Wiring and timeouts |
//! | [`AnalysisResult`] | Caller-facing outcome |
//! | [`AnalysisSummary`] | History entry |
//! | [`WriteThrough`] | Detached fast-cache population |

mod builder;
mod result;
mod write_through;

pub use builder::AnalysisOrchestratorBuilder;
pub use result::{AnalysisResult, AnalysisSummary};
pub use write_through::WriteThrough;

use crate::cache::{CacheKey, FastCacheClient};
use crate::config_cache::ConfigCache;
use crate::provider::{AnalysisProvider, PromptBuilder, ProviderOutput};
use crate::store::{AnalysisRecord, AnalysisStore, NewAnalysisRecord, StoreError, StoreResult};
use crate::structured::AnalysisReport;
use crate::telemetry::{MetricsSink, ResolutionPath, UsageMetric};
use crate::tokens::PricingTable;
use crate::types::{AnalysisParams, ContentItem};
use crate::{Error, ErrorContext, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of a persist attempt.
enum Persisted {
    Created(AnalysisRecord),
    /// Another request holds the key; this is its record.
    Existing(AnalysisRecord),
    /// The store failed; the record was never written.
    Unsaved(AnalysisRecord),
}

/// Entry point of the analysis core.
///
/// Cheap to clone; clones share every collaborator. No lock serializes calls:
/// concurrent duplicates are resolved by the store's uniqueness constraint.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    store: Arc<dyn AnalysisStore>,
    provider: Arc<dyn AnalysisProvider>,
    fast_cache: Arc<FastCacheClient>,
    write_through: WriteThrough,
    config_cache: Option<Arc<ConfigCache>>,
    pricing: Arc<PricingTable>,
    metrics: Arc<dyn MetricsSink>,
    store_timeout: Duration,
    provider_timeout: Duration,
    default_language: String,
}

impl AnalysisOrchestrator {
    pub fn builder() -> AnalysisOrchestratorBuilder {
        AnalysisOrchestratorBuilder::new()
    }

    pub fn fast_cache(&self) -> &FastCacheClient {
        &self.fast_cache
    }

    pub fn write_through(&self) -> &WriteThrough {
        &self.write_through
    }

    pub async fn analyze_or_get_cached(
        &self,
        items: &[ContentItem],
        params: &AnalysisParams,
        session_ref: Option<&str>,
    ) -> Result<AnalysisResult> {
        if items.is_empty() {
            return Err(Error::validation_with_context(
                "at least one content item is required",
                ErrorContext::new().with_field_path("items").with_source("orchestrator"),
            ));
        }
        let started = Instant::now();
        let session = session_ref.map(str::to_string);
        let key = CacheKey::for_request(items, params);
        let request_key = key.request_key();
        info!(
            fingerprint = %key.fingerprint.short(),
            variant = %key.variant,
            items = items.len(),
            "analysis requested"
        );

        match self.store_call(self.store.find_by_key(&request_key)).await {
            Ok(Some(record)) => {
                info!(id = %record.id, "durable hit");
                let result = AnalysisResult::from_record(
                    record,
                    ResolutionPath::DurableHit,
                    session.clone(),
                    elapsed_ms(started),
                )?;
                self.emit(UsageMetric::new(ResolutionPath::DurableHit, &request_key, result.latency_ms)
                    .with_session(session))
                    .await;
                return Ok(result);
            }
            Ok(None) => debug!(key = %request_key, "durable miss"),
            Err(e) => warn!(key = %request_key, error = %e, "durable lookup failed, treating as miss"),
        }

        if let Some(cached) = self.fast_cache.get::<AnalysisRecord>(&key).await {
            if cached.request_key != request_key {
                warn!(key = %request_key, cached = %cached.request_key, "fast cache entry has a foreign key, ignoring");
            } else if let Err(e) = serde_json::from_value::<AnalysisReport>(cached.payload.clone()) {
                warn!(key = %request_key, error = %e, "fast cache entry does not match the report schema, treating as miss");
            } else {
                return self.resolve_fast_hit(cached, &session, started).await;
            }
        }

        let language = params
            .language()
            .unwrap_or(self.default_language.as_str())
            .to_string();
        let base = match &self.config_cache {
            Some(cache) => self.prompt_config(cache, &language).await,
            None => None,
        };
        if base.is_none() {
            debug!(language = %language, "no configured prompt, using built-in default");
        }
        let prompt = PromptBuilder::new(base).build(params, &language);

        let output = self.call_provider(items, &prompt).await?;
        let report = AnalysisReport::from_provider_json(&output.payload)?;
        let cost = self.pricing.cost(&output.model, &output.usage);

        let new_record = NewAnalysisRecord {
            request_key: request_key.clone(),
            fingerprint: key.fingerprint,
            variant: key.variant,
            session_ref: session.clone(),
            product_name: report.product_name().map(str::to_string),
            payload: report.to_value()?,
        };

        match self.persist(new_record).await? {
            Persisted::Created(record) => {
                self.write_through.submit(key, record.clone());
                let latency = elapsed_ms(started);
                let result =
                    AnalysisResult::from_record(record, ResolutionPath::ProviderCall, session.clone(), latency)?
                        .with_usage(output.model.clone(), output.usage, cost);
                self.emit(
                    UsageMetric::new(ResolutionPath::ProviderCall, &request_key, latency)
                        .with_session(session)
                        .with_usage(output.model, output.usage, cost),
                )
                .await;
                Ok(result)
            }
            Persisted::Existing(record) => {
                info!(id = %record.id, discarded_cost_usd = cost, "persist conflict resolved to existing record");
                let latency = elapsed_ms(started);
                let result = AnalysisResult::from_record(
                    record,
                    ResolutionPath::ConflictRecovered,
                    session.clone(),
                    latency,
                )?;
                self.emit(
                    UsageMetric::new(ResolutionPath::ConflictRecovered, &request_key, latency)
                        .with_session(session)
                        .with_discarded(output.model, output.usage, cost),
                )
                .await;
                Ok(result)
            }
            Persisted::Unsaved(record) => {
                self.write_through.submit(key, record.clone());
                let latency = elapsed_ms(started);
                let result =
                    AnalysisResult::from_record(record, ResolutionPath::ProviderCall, session.clone(), latency)?
                        .with_usage(output.model.clone(), output.usage, cost)
                        .unpersisted();
                self.emit(
                    UsageMetric::new(ResolutionPath::ProviderCall, &request_key, latency)
                        .with_session(session)
                        .with_usage(output.model, output.usage, cost),
                )
                .await;
                Ok(result)
            }
        }
    }

    /// Most recent analyses for a session, newest first.
    pub async fn get_history(&self, session_ref: &str, limit: usize) -> Result<Vec<AnalysisSummary>> {
        let records = self
            .store_call(self.store.list_recent(session_ref, limit))
            .await?;
        Ok(records.iter().map(AnalysisSummary::from).collect())
    }

    /// `None` for unknown ids and for strings that are not UUIDs.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<AnalysisResult>> {
        let Ok(id) = Uuid::parse_str(id.trim()) else {
            debug!(id = id, "not a valid analysis id");
            return Ok(None);
        };
        let started = Instant::now();
        match self.store_call(self.store.get_by_id(id)).await? {
            Some(record) => {
                let session = record.session_ref.clone();
                AnalysisResult::from_record(record, ResolutionPath::DurableHit, session, elapsed_ms(started))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    async fn resolve_fast_hit(
        &self,
        cached: AnalysisRecord,
        session: &Option<String>,
        started: Instant,
    ) -> Result<AnalysisResult> {
        info!(key = %cached.request_key, "fast cache hit after durable miss");
        let request_key = cached.request_key.clone();
        let new_record = NewAnalysisRecord {
            request_key: cached.request_key.clone(),
            fingerprint: cached.fingerprint,
            variant: cached.variant,
            session_ref: session.clone(),
            product_name: cached.product_name.clone(),
            payload: cached.payload.clone(),
        };
        let (record, persisted) = match self.persist(new_record).await {
            Ok(Persisted::Created(record)) | Ok(Persisted::Existing(record)) => (record, true),
            Ok(Persisted::Unsaved(_)) | Err(_) => (cached, false),
        };
        let latency = elapsed_ms(started);
        let mut result =
            AnalysisResult::from_record(record, ResolutionPath::FastCacheHit, session.clone(), latency)?;
        if !persisted {
            result = result.unpersisted();
        }
        self.emit(UsageMetric::new(ResolutionPath::FastCacheHit, &request_key, latency).with_session(session.clone()))
            .await;
        Ok(result)
    }

    async fn call_provider(&self, items: &[ContentItem], prompt: &str) -> Result<ProviderOutput> {
        let started = Instant::now();
        match tokio::time::timeout(self.provider_timeout, self.provider.analyze(items, prompt)).await {
            Ok(Ok(output)) => {
                debug!(
                    provider = self.provider.name(),
                    model = %output.model,
                    elapsed_ms = elapsed_ms(started),
                    "provider call completed"
                );
                Ok(output)
            }
            Ok(Err(e)) => {
                error!(provider = self.provider.name(), error = %e, "provider call failed");
                Err(e)
            }
            Err(_) => {
                let timeout_ms = self.provider_timeout.as_millis() as u64;
                error!(provider = self.provider.name(), timeout_ms, "provider call timed out");
                Err(Error::ProviderTimeout { timeout_ms })
            }
        }
    }

    /// Optimistic create. The unique key decides concurrent duplicates.
    async fn persist(&self, new_record: NewAnalysisRecord) -> Result<Persisted> {
        let request_key = new_record.request_key.clone();
        let fallback = new_record.clone();
        match self.store_call(self.store.create(new_record)).await {
            Ok(record) => {
                info!(id = %record.id, key = %request_key, "analysis persisted");
                Ok(Persisted::Created(record))
            }
            Err(StoreError::Conflict { .. }) => {
                match self.store_call(self.store.find_by_key(&request_key)).await {
                    Ok(Some(existing)) => Ok(Persisted::Existing(existing)),
                    Ok(None) => Err(Error::persistence_with_context(
                        "conflicting record not found on re-read",
                        ErrorContext::new().with_details(request_key).with_source("orchestrator"),
                    )),
                    Err(e) => Err(Error::persistence_with_context(
                        "re-read after conflict failed",
                        ErrorContext::new()
                            .with_details(format!("{}: {}", request_key, e))
                            .with_source("orchestrator"),
                    )),
                }
            }
            Err(e) => {
                error!(key = %request_key, error = %e, "durable write failed, returning unsaved result");
                Ok(Persisted::Unsaved(fallback.into_record()))
            }
        }
    }

    async fn store_call<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(r) => r,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// Bounded by the store timeout. On expiry any cached content is used, even if stale.
    async fn prompt_config(&self, cache: &ConfigCache, language: &str) -> Option<String> {
        match tokio::time::timeout(self.store_timeout, cache.get_config(language)).await {
            Ok(content) => content,
            Err(_) => {
                let stale = cache.cached(language).await;
                warn!(
                    language = language,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    serving_stale = stale.is_some(),
                    "prompt config lookup timed out"
                );
                stale
            }
        }
    }

    async fn emit(&self, metric: UsageMetric) {
        let path = metric.path;
        match tokio::time::timeout(self.store_timeout, self.metrics.record(metric)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(sink = self.metrics.name(), path = %path, error = %e, "metric emission failed")
            }
            Err(_) => warn!(sink = self.metrics.name(), path = %path, "metric emission timed out"),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

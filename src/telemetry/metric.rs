//! Usage metric records and aggregation.

use crate::tokens::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which path produced the result of one orchestration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    DurableHit,
    FastCacheHit,
    ProviderCall,
    /// Provider was called but another request persisted first; the persisted
    /// record was returned instead.
    ConflictRecovered,
}

impl ResolutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPath::DurableHit => "durable_hit",
            ResolutionPath::FastCacheHit => "fast_cache_hit",
            ResolutionPath::ProviderCall => "provider_call",
            ResolutionPath::ConflictRecovered => "conflict_recovered",
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        !matches!(self, ResolutionPath::ProviderCall)
    }
}

impl std::fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One orchestration outcome. Created once per call, never updated.
///
/// `cost_usd` and `tokens` are set only on the `ProviderCall` path. On
/// `ConflictRecovered` the spend of the discarded provider call is kept in the
/// `discarded_*` fields so it is visible without being counted as canonical cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetric {
    pub id: Uuid,
    pub session_ref: Option<String>,
    pub request_key: String,
    pub path: ResolutionPath,
    pub cache_hit: bool,
    pub latency_ms: u64,
    pub cost_usd: Option<f64>,
    pub tokens: Option<TokenUsage>,
    pub model: Option<String>,
    pub discarded_cost_usd: Option<f64>,
    pub discarded_tokens: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl UsageMetric {
    pub fn new(path: ResolutionPath, request_key: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_ref: None,
            request_key: request_key.into(),
            path,
            cache_hit: path.is_cache_hit(),
            latency_ms,
            cost_usd: None,
            tokens: None,
            model: None,
            discarded_cost_usd: None,
            discarded_tokens: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_ref: Option<String>) -> Self {
        self.session_ref = session_ref;
        self
    }

    pub fn with_usage(mut self, model: impl Into<String>, tokens: TokenUsage, cost_usd: f64) -> Self {
        self.model = Some(model.into());
        self.tokens = Some(tokens);
        self.cost_usd = Some(cost_usd);
        self
    }

    pub fn with_discarded(mut self, model: impl Into<String>, tokens: TokenUsage, cost_usd: f64) -> Self {
        self.model = Some(model.into());
        self.discarded_tokens = Some(tokens.total_tokens);
        self.discarded_cost_usd = Some(cost_usd);
        self
    }
}

/// Aggregate view over a set of metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub cache_hits: u64,
    /// Fraction in `[0, 1]`.
    pub cache_hit_rate: f64,
    pub total_cost_usd: f64,
    pub average_latency_ms: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub duplicate_provider_calls: u64,
    pub discarded_cost_usd: f64,
}

impl MetricsSummary {
    pub fn from_metrics<'a, I>(metrics: I) -> Self
    where
        I: IntoIterator<Item = &'a UsageMetric>,
    {
        let mut s = MetricsSummary::default();
        let mut latency_sum: u64 = 0;
        for m in metrics {
            s.total_requests += 1;
            if m.cache_hit {
                s.cache_hits += 1;
            }
            latency_sum = latency_sum.saturating_add(m.latency_ms);
            s.total_cost_usd += m.cost_usd.unwrap_or(0.0);
            if let Some(t) = m.tokens {
                s.prompt_tokens = s.prompt_tokens.saturating_add(t.prompt_tokens);
                s.completion_tokens = s.completion_tokens.saturating_add(t.completion_tokens);
                s.total_tokens = s.total_tokens.saturating_add(t.total_tokens);
            }
            if m.path == ResolutionPath::ConflictRecovered {
                s.duplicate_provider_calls += 1;
                s.discarded_cost_usd += m.discarded_cost_usd.unwrap_or(0.0);
            }
        }
        if s.total_requests > 0 {
            s.cache_hit_rate = s.cache_hits as f64 / s.total_requests as f64;
            s.average_latency_ms = latency_sum as f64 / s.total_requests as f64;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_follows_path() {
        assert!(UsageMetric::new(ResolutionPath::DurableHit, "k", 1).cache_hit);
        assert!(UsageMetric::new(ResolutionPath::FastCacheHit, "k", 1).cache_hit);
        assert!(UsageMetric::new(ResolutionPath::ConflictRecovered, "k", 1).cache_hit);
        assert!(!UsageMetric::new(ResolutionPath::ProviderCall, "k", 1).cache_hit);
    }

    #[test]
    fn test_summary() {
        let metrics = vec![
            UsageMetric::new(ResolutionPath::ProviderCall, "a", 1000).with_usage(
                "gpt-4o",
                TokenUsage::new(100, 50),
                0.02,
            ),
            UsageMetric::new(ResolutionPath::DurableHit, "a", 10),
            UsageMetric::new(ResolutionPath::ConflictRecovered, "a", 990).with_discarded(
                "gpt-4o",
                TokenUsage::new(100, 40),
                0.015,
            ),
        ];
        let s = MetricsSummary::from_metrics(&metrics);
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.cache_hits, 2);
        assert!((s.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.total_cost_usd - 0.02).abs() < 1e-12);
        assert_eq!(s.total_tokens, 150);
        assert_eq!(s.duplicate_provider_calls, 1);
        assert!((s.discarded_cost_usd - 0.015).abs() < 1e-12);
        assert!((s.average_latency_ms - 2000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        let s = MetricsSummary::from_metrics(std::iter::empty());
        assert_eq!(s, MetricsSummary::default());
    }
}

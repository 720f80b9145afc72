//! 用量指标模块：记录每次分析编排的结果路径、延迟、成本和 Token 消耗。
//!
//! Usage Metrics Module.
//!
//! Every orchestration call emits exactly one [`UsageMetric`], whichever path
//! produced the result. Emission is best-effort: a sink failure is logged by the
//! orchestrator and never fails the request.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`UsageMetric`] | One orchestration outcome |
//! | [`ResolutionPath`] | Durable hit, fast-cache hit, provider call, conflict recovery |
//! | [`MetricsSink`] | Trait for metric destinations |
//! | [`NoopMetricsSink`] | Discards everything |
//! | [`InMemoryMetricsSink`] | Bounded in-memory sink with [`MetricsSummary`] |
//! | [`CompositeMetricsSink`] | Fan-out to several sinks |
//! | `PgMetricsSink` | `ai_consumption_metrics` table (`postgres` feature) |

mod metric;

pub use metric::{MetricsSummary, ResolutionPath, UsageMetric};

use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Destination for usage metrics.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, metric: UsageMetric) -> Result<()>;

    fn name(&self) -> &'static str {
        "metrics"
    }
}

/// Default sink: no collection.
pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn record(&self, _metric: UsageMetric) -> Result<()> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "noop"
    }
}

/// In-memory sink keeping the most recent `max_metrics` records.
pub struct InMemoryMetricsSink {
    metrics: Arc<RwLock<Vec<UsageMetric>>>,
    max_metrics: usize,
}

impl InMemoryMetricsSink {
    pub fn new(max: usize) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Vec::new())),
            max_metrics: max.max(1),
        }
    }
    pub fn metrics(&self) -> Vec<UsageMetric> {
        self.metrics.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
    pub fn metrics_for_session(&self, session_ref: &str) -> Vec<UsageMetric> {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.session_ref.as_deref() == Some(session_ref))
            .cloned()
            .collect()
    }
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_metrics(self.metrics.read().unwrap_or_else(|e| e.into_inner()).iter())
    }
    pub fn clear(&self) {
        self.metrics.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
    pub fn len(&self) -> usize {
        self.metrics.read().unwrap_or_else(|e| e.into_inner()).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryMetricsSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn record(&self, metric: UsageMetric) -> Result<()> {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.push(metric);
        if metrics.len() > self.max_metrics {
            metrics.remove(0);
        }
        Ok(())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Sends each metric to every sink; the first error is returned after all
/// sinks have been tried.
pub struct CompositeMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl CompositeMetricsSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }
    pub fn add_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Default for CompositeMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSink for CompositeMetricsSink {
    async fn record(&self, metric: UsageMetric) -> Result<()> {
        let mut first_err = None;
        for s in &self.sinks {
            if let Err(e) = s.record(metric.clone()).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
    fn name(&self) -> &'static str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct FailingSink;

    #[async_trait]
    impl MetricsSink for FailingSink {
        async fn record(&self, _metric: UsageMetric) -> Result<()> {
            Err(Error::Transport("sink down".into()))
        }
    }

    #[tokio::test]
    async fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryMetricsSink::new(2);
        for key in ["a", "b", "c"] {
            sink.record(UsageMetric::new(ResolutionPath::DurableHit, key, 1))
                .await
                .unwrap();
        }
        let keys: Vec<String> = sink.metrics().into_iter().map(|m| m.request_key).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_session_filter() {
        let sink = InMemoryMetricsSink::default();
        sink.record(
            UsageMetric::new(ResolutionPath::ProviderCall, "a", 5).with_session(Some("s1".into())),
        )
        .await
        .unwrap();
        sink.record(UsageMetric::new(ResolutionPath::DurableHit, "a", 1))
            .await
            .unwrap();
        assert_eq!(sink.metrics_for_session("s1").len(), 1);
        assert_eq!(sink.summary().total_requests, 2);
    }

    #[tokio::test]
    async fn test_composite_tries_every_sink() {
        let memory = Arc::new(InMemoryMetricsSink::default());
        let composite = CompositeMetricsSink::new()
            .add_sink(Arc::new(FailingSink))
            .add_sink(memory.clone());
        let result = composite
            .record(UsageMetric::new(ResolutionPath::DurableHit, "a", 1))
            .await;
        assert!(result.is_err());
        assert_eq!(memory.len(), 1);
    }
}

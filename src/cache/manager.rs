//! Circuit-breaker protected fast cache client.

use super::backend::CacheBackend;
use super::error::CacheError;
use super::key::CacheKey;
use crate::resilience::{CircuitBreaker, CircuitBreakerSnapshot, CircuitState};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FastCacheConfig {
    pub enabled: bool,
    pub default_ttl: Duration,
    /// Upper bound on a single backend call; an elapsed timeout counts as a failure.
    pub op_timeout: Duration,
    pub max_entry_size: usize,
    pub key_prefix: String,
}

impl Default for FastCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(86_400),
            op_timeout: Duration::from_secs(2),
            max_entry_size: 10 * 1024 * 1024,
            key_prefix: "vitai:cache:v1".to_string(),
        }
    }
}

impl FastCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
    /// Operations not attempted (disabled, circuit open, oversized entry).
    pub skipped: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
}
impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a best-effort cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Not attempted: disabled, circuit open, or entry too large.
    Skipped,
    /// Attempted and failed; the breaker has been told.
    Failed,
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored)
    }
}

#[derive(Debug, Clone)]
pub struct CacheHealth {
    pub backend: &'static str,
    pub enabled: bool,
    pub healthy: bool,
    pub circuit: CircuitState,
    pub error: Option<String>,
}

/// Fast-tier client. Never surfaces backend errors.
///
/// Every attempted backend call reports its outcome to the shared circuit
/// breaker; when the breaker refuses, the call is skipped entirely. This client
/// is the only component that mutates the breaker.
pub struct FastCacheClient {
    config: FastCacheConfig,
    backend: Arc<dyn CacheBackend>,
    breaker: Arc<CircuitBreaker>,
    stats: AtomicStats,
}

impl FastCacheClient {
    pub fn new(
        config: FastCacheConfig,
        backend: Arc<dyn CacheBackend>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            backend,
            breaker,
            stats: AtomicStats::new(),
        }
    }

    /// A client that never stores anything.
    pub fn disabled() -> Self {
        Self::new(
            FastCacheConfig::default().with_enabled(false),
            Arc::new(super::backend::NullCache::new()),
            Arc::new(CircuitBreaker::default()),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.backend.is_enabled()
    }

    fn permitted(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.breaker.can_execute()
    }

    async fn guarded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(self.config.op_timeout, op).await {
            Ok(r) => r,
            Err(_) => Err(CacheError::Timeout),
        };
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.breaker.record_failure();
            }
        }
        result
    }

    /// Look up a value. Any failure is reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.permitted() {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "fast cache skipped (disabled or circuit open)");
            return None;
        }
        let full = key.prefixed(&self.config.key_prefix);
        match self.guarded(self.backend.get(&full)).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(val) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %full, "fast cache HIT");
                    Some(val)
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %full, error = %e, "fast cache entry undecodable, treating as miss");
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full, "fast cache MISS");
                None
            }
            Err(e) => {
                warn!(key = %full, error = %e, backend = self.backend.name(), "fast cache lookup failed");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> PutOutcome {
        self.put_with_ttl(key, value, self.config.default_ttl).await
    }

    /// Best-effort write; safe to run detached from the caller.
    pub async fn put_with_ttl<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> PutOutcome {
        if !self.permitted() {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "fast cache write skipped (disabled or circuit open)");
            return PutOutcome::Skipped;
        }
        let data = match serde_json::to_vec(value) {
            Ok(d) => d,
            Err(e) => {
                // Not a backend fault; the breaker already granted a permit, so
                // report the backend as healthy to release a half-open trial.
                self.breaker.record_success();
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "fast cache value not serializable");
                return PutOutcome::Failed;
            }
        };
        if data.len() > self.config.max_entry_size {
            self.breaker.record_success();
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, size = data.len(), "fast cache entry exceeds max size");
            return PutOutcome::Skipped;
        }
        let full = key.prefixed(&self.config.key_prefix);
        match self.guarded(self.backend.set(&full, &data, ttl)).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full, ttl_secs = ttl.as_secs(), "fast cache SET");
                PutOutcome::Stored
            }
            Err(e) => {
                warn!(key = %full, error = %e, backend = self.backend.name(), "fast cache write failed");
                PutOutcome::Failed
            }
        }
    }

    /// Drop entries whose key (after the namespace prefix) starts with `pattern`.
    /// An empty pattern clears the whole namespace.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        if !self.permitted() {
            return 0;
        }
        let prefix = if self.config.key_prefix.is_empty() {
            pattern.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, pattern)
        };
        match self.guarded(self.backend.delete_prefix(&prefix)).await {
            Ok(n) => {
                debug!(prefix = %prefix, deleted = n, "fast cache invalidated");
                n
            }
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "fast cache invalidation failed");
                0
            }
        }
    }

    pub async fn health(&self) -> CacheHealth {
        let enabled = self.is_enabled();
        let (healthy, error) = if !self.permitted() {
            (false, None)
        } else {
            match self.guarded(self.backend.ping()).await {
                Ok(()) => (true, None),
                Err(e) => (false, Some(e.to_string())),
            }
        };
        CacheHealth {
            backend: self.backend.name(),
            enabled,
            healthy,
            circuit: self.breaker.state(),
            error,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn circuit(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &FastCacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCache;
    use crate::cache::error::CacheResult;
    use crate::resilience::CircuitBreakerConfig;
    use crate::types::{AnalysisParams, ContentItem};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        score: f64,
    }

    /// Backend that fails every call and counts attempts.
    #[derive(Default)]
    struct BrokenBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Connection("refused".into()))
        }
        async fn set(&self, _: &str, _: &[u8], _: Duration) -> CacheResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Connection("refused".into()))
        }
        async fn delete(&self, _: &str) -> CacheResult<bool> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn delete_prefix(&self, _: &str) -> CacheResult<u64> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn ping(&self) -> CacheResult<()> {
            Err(CacheError::Connection("refused".into()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl CacheBackend for SlowBackend {
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(None)
        }
        async fn set(&self, _: &str, _: &[u8], _: Duration) -> CacheResult<()> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
        async fn delete(&self, _: &str) -> CacheResult<bool> {
            Ok(false)
        }
        async fn delete_prefix(&self, _: &str) -> CacheResult<u64> {
            Ok(0)
        }
        async fn ping(&self) -> CacheResult<()> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn key(content: &[u8]) -> CacheKey {
        CacheKey::for_request(
            &[ContentItem::new(content.to_vec(), "image/png")],
            &AnalysisParams::default(),
        )
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_recovery_timeout(Duration::from_secs(60)),
        ))
    }

    #[tokio::test]
    async fn test_roundtrip_through_memory_backend() {
        let client = FastCacheClient::new(
            FastCacheConfig::default(),
            Arc::new(MemoryCache::new(10)),
            breaker(3),
        );
        let value = Payload { name: "granola".into(), score: 6.5 };
        assert_eq!(client.put(&key(b"a"), &value).await, PutOutcome::Stored);
        let back: Option<Payload> = client.get(&key(b"a")).await;
        assert_eq!(back, Some(value));
        let miss: Option<Payload> = client.get(&key(b"b")).await;
        assert!(miss.is_none());

        let stats = client.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_backend_errors_become_misses_and_open_circuit() {
        let backend = Arc::new(BrokenBackend::default());
        let client = FastCacheClient::new(FastCacheConfig::default(), backend.clone(), breaker(2));

        let first: Option<Payload> = client.get(&key(b"a")).await;
        assert!(first.is_none());
        assert_eq!(client.put(&key(b"a"), &Payload { name: "x".into(), score: 1.0 }).await, PutOutcome::Failed);
        assert_eq!(client.circuit().state, CircuitState::Open);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        // circuit open: no further backend calls
        let skipped: Option<Payload> = client.get(&key(b"a")).await;
        assert!(skipped.is_none());
        assert_eq!(client.put(&key(b"a"), &Payload { name: "x".into(), score: 1.0 }).await, PutOutcome::Skipped);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.stats().skipped, 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let client = FastCacheClient::new(
            FastCacheConfig::default().with_timeout(Duration::from_millis(20)),
            Arc::new(SlowBackend),
            breaker(1),
        );
        let v: Option<Payload> = client.get(&key(b"a")).await;
        assert!(v.is_none());
        assert_eq!(client.circuit().state, CircuitState::Open);
        assert_eq!(client.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new(10));
        let config = FastCacheConfig::default();
        let k = key(b"a");
        backend
            .set(&k.prefixed(&config.key_prefix), b"not json", Duration::from_secs(60))
            .await
            .unwrap();
        let client = FastCacheClient::new(config, backend, breaker(3));
        let v: Option<Payload> = client.get(&k).await;
        assert!(v.is_none());
        assert_eq!(client.stats().errors, 1);
        assert_eq!(client.circuit().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_disabled_client_never_touches_backend() {
        let backend = Arc::new(BrokenBackend::default());
        let client = FastCacheClient::new(
            FastCacheConfig::default().with_enabled(false),
            backend.clone(),
            breaker(1),
        );
        let v: Option<Payload> = client.get(&key(b"a")).await;
        assert!(v.is_none());
        assert_eq!(client.put(&key(b"a"), &1u32).await, PutOutcome::Skipped);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(!FastCacheClient::disabled().is_enabled());
    }

    #[tokio::test]
    async fn test_invalidate_and_health() {
        let backend = Arc::new(MemoryCache::new(10));
        let client = FastCacheClient::new(FastCacheConfig::default(), backend.clone(), breaker(3));
        client.put(&key(b"a"), &1u32).await;
        client.put(&key(b"b"), &2u32).await;
        assert_eq!(client.invalidate("").await, 2);
        assert!(backend.is_empty());

        let health = client.health().await;
        assert!(health.healthy);
        assert_eq!(health.backend, "memory");
        assert_eq!(health.circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_oversized_entry_skipped() {
        let mut config = FastCacheConfig::default();
        config.max_entry_size = 4;
        let client = FastCacheClient::new(config, Arc::new(MemoryCache::new(10)), breaker(3));
        let outcome = client.put(&key(b"a"), &"a long string value").await;
        assert_eq!(outcome, PutOutcome::Skipped);
    }
}

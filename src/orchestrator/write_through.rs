//! Detached fast-cache population.

use crate::cache::{CacheKey, FastCacheClient, PutOutcome};
use crate::store::AnalysisRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Hands records to a background task that writes them to the fast cache.
///
/// Best-effort, no backpressure: each submission spawns its own task, the
/// caller never awaits it, and failures are only logged. Tasks are not tied to
/// the caller's cancellation scope.
#[derive(Clone)]
pub struct WriteThrough {
    cache: Arc<FastCacheClient>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WriteThrough {
    pub fn new(cache: Arc<FastCacheClient>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Queue a write. Returns immediately.
    pub fn submit(&self, key: CacheKey, record: AnalysisRecord) {
        if !self.cache.is_enabled() {
            return;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let idle = Arc::clone(&self.idle);
        tokio::spawn(async move {
            match cache.put(&key, &record).await {
                PutOutcome::Stored => debug!(key = %key, "write-through stored"),
                PutOutcome::Skipped => debug!(key = %key, "write-through skipped"),
                PutOutcome::Failed => warn!(key = %key, "write-through failed"),
            }
            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every submitted write has finished.
    pub async fn idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FastCacheConfig, MemoryCache};
    use crate::fingerprint::fingerprint;
    use crate::resilience::CircuitBreaker;
    use crate::store::NewAnalysisRecord;
    use crate::types::{AnalysisParams, AnalysisVariant};
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_then_idle_makes_entry_visible() {
        let cache = Arc::new(FastCacheClient::new(
            FastCacheConfig::default(),
            Arc::new(MemoryCache::new(16)),
            Arc::new(CircuitBreaker::default()),
        ));
        let wt = WriteThrough::new(Arc::clone(&cache));
        let fp = fingerprint([b"x".as_slice()]);
        let key = CacheKey::new(fp, &AnalysisParams::default());
        let record = NewAnalysisRecord {
            request_key: key.request_key(),
            fingerprint: fp,
            variant: AnalysisVariant::Complete,
            session_ref: None,
            product_name: None,
            payload: json!({"confidence_score": 0.5}),
        }
        .into_record();

        wt.submit(key.clone(), record.clone());
        wt.idle().await;
        assert_eq!(wt.in_flight(), 0);
        let cached: Option<AnalysisRecord> = cache.get(&key).await;
        assert_eq!(cached, Some(record));
    }

    #[tokio::test]
    async fn test_disabled_cache_submits_nothing() {
        let wt = WriteThrough::new(Arc::new(FastCacheClient::disabled()));
        let fp = fingerprint([b"x".as_slice()]);
        let key = CacheKey::new(fp, &AnalysisParams::default());
        let record = NewAnalysisRecord {
            request_key: key.request_key(),
            fingerprint: fp,
            variant: AnalysisVariant::Complete,
            session_ref: None,
            product_name: None,
            payload: json!({}),
        }
        .into_record();
        wt.submit(key, record);
        assert_eq!(wt.in_flight(), 0);
        wt.idle().await;
    }
}

//! 配置缓存模块：以 TTL 缓存外部存储的提示词与配置内容。
//!
//! # Configuration TTL Cache Module
//!
//! Prompt text and similar configuration live in an external source (the
//! `prompt_versions` table in production). Reading it on every analysis would
//! add a round trip per request, so [`ConfigCache`] keeps one shared entry per
//! key and refreshes it lazily once its TTL has elapsed.
//!
//! ## Failure semantics
//!
//! | Source result | Cached entry | Returned |
//! |---------------|--------------|----------|
//! | `Ok(Some(c))` | replaced by `c` | `Some(c)` |
//! | `Ok(None)` | dropped | `None` (not configured) |
//! | `Err(_)` | kept | stale content, or `None` |
//! | no answer within the fetch timeout | kept | stale content, or `None` |
//!
//! `None` is never an error: callers fall back to a built-in default.
//!
//! ```rust
//! use ai_analysis_core::config_cache::{ConfigCache, PromptRegistry, PromptStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(PromptRegistry::new());
//! registry.create_version("v1", "es", "Analiza el producto", true).await.unwrap();
//!
//! let cache = ConfigCache::new(registry, Duration::from_secs(300));
//! assert_eq!(cache.get_config("es").await.as_deref(), Some("Analiza el producto"));
//! # });
//! ```

mod prompts;

pub use prompts::{PromptRegistry, PromptStore, PromptVersion};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Upper bound on a single source fetch unless overridden.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only store of named content blobs.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// `Ok(None)` when nothing is configured under `key`.
    async fn fetch(&self, key: &str) -> crate::Result<Option<String>>;
}

#[derive(Debug, Clone)]
struct ConfigEntry {
    content: String,
    fetched_at: Instant,
}

/// Shared TTL cache in front of a [`ConfigSource`].
///
/// Concurrent callers that all observe a stale entry may each fetch; the
/// entry is replaced under the write lock and the last writer wins.
pub struct ConfigCache {
    source: Arc<dyn ConfigSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    entries: RwLock<HashMap<String, ConfigEntry>>,
    fetches: AtomicU64,
}

impl ConfigCache {
    pub fn new(source: Arc<dyn ConfigSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            entries: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whatever is cached for `key`, expired or not. Never touches the source.
    pub async fn cached(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).map(|e| e.content.clone())
    }

    pub async fn get_config(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Some(entry.content.clone());
                }
            }
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.source.fetch(key)).await {
            Ok(r) => r,
            Err(_) => {
                let stale = self.cached(key).await;
                warn!(
                    key = key,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    serving_stale = stale.is_some(),
                    "config fetch timed out"
                );
                return stale;
            }
        };
        match fetched {
            Ok(Some(content)) => {
                debug!(key = key, len = content.len(), "config refreshed");
                self.entries.write().await.insert(
                    key.to_string(),
                    ConfigEntry {
                        content: content.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Some(content)
            }
            Ok(None) => {
                debug!(key = key, "no configuration found");
                self.entries.write().await.remove(key);
                None
            }
            Err(e) => {
                let stale = self.cached(key).await;
                warn!(
                    key = key,
                    error = %e,
                    serving_stale = stale.is_some(),
                    "config fetch failed"
                );
                stale
            }
        }
    }

    /// Force the next access for `key` to refetch.
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Source fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

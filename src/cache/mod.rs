//! 快速缓存模块：以熔断器保护的可插拔后端缓存分析结果。
//!
//! # Fast Cache Module
//!
//! The fast tier sits behind the durable store: it is consulted only after a
//! durable miss and is populated by write-through after a successful persist.
//! It is a latency optimization and never a correctness dependency; every
//! backend failure becomes a miss or a failed write.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FastCacheClient`] | Breaker-gated client with timeouts and statistics |
//! | [`FastCacheConfig`] | Enable flag, TTL, timeout, key prefix and size limit |
//! | [`CacheBackend`] | Trait for raw key-value backends |
//! | [`MemoryCache`] | In-process LRU backend with per-entry TTL |
//! | [`NullCache`] | Backend that never stores anything |
//! | `RedisCache` | Redis / Dragonfly backend (`redis` feature) |
//! | [`CacheKey`] | Fingerprint + variant + parameter digest |
//!
//! ## Example
//!
//! ```rust
//! use ai_analysis_core::cache::{FastCacheClient, FastCacheConfig, MemoryCache};
//! use ai_analysis_core::resilience::CircuitBreaker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = FastCacheClient::new(
//!     FastCacheConfig::default().with_ttl(Duration::from_secs(3600)),
//!     Arc::new(MemoryCache::new(1000)),
//!     Arc::new(CircuitBreaker::default()),
//! );
//! assert!(client.is_enabled());
//! ```
//!
//! ## Key layout
//!
//! `{prefix}:{fingerprint}:{variant}:{params_digest}` where the digest is the
//! literal `default` for unpersonalized requests.

mod backend;
mod error;
mod key;
mod manager;
#[cfg(feature = "redis")]
mod redis;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use manager::{CacheHealth, CacheStats, FastCacheClient, FastCacheConfig, PutOutcome};
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

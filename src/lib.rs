//! # ai-analysis-core
//!
//! 分析编排核心：内容指纹、持久化去重、熔断保护的快速缓存与 TTL 配置缓存。
//!
//! Analysis orchestration core for AI-backed product analysis. Submitted
//! content is fingerprinted, resolved against a durable store first, then a
//! circuit-breaker protected fast cache, and only then sent to the external
//! provider. Concurrent duplicates are settled by the store's uniqueness
//! constraint, so a given request is paid for and persisted once.
//!
//! ## Core Guarantees
//!
//! - **Dedup**: identical content and parameters never produce two records
//! - **Cache is optional**: every path is correct with the fast cache down
//! - **Single terminal error**: callers get a complete result or one error
//! - **One metric per call**: cost, tokens, latency and resolution path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_analysis_core::orchestrator::AnalysisOrchestrator;
//! use ai_analysis_core::provider::{OpenAiConfig, OpenAiProvider};
//! use ai_analysis_core::store::MemoryAnalysisStore;
//! use ai_analysis_core::types::{AnalysisParams, ContentItem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_analysis_core::Result<()> {
//!     let provider = OpenAiProvider::new(OpenAiConfig::default().with_api_key("sk-..."))?;
//!     let orchestrator = AnalysisOrchestrator::builder()
//!         .store(Arc::new(MemoryAnalysisStore::new()))
//!         .provider(Arc::new(provider))
//!         .build()?;
//!
//!     let items = vec![ContentItem::from_file("label.jpg")?];
//!     let params = AnalysisParams::default().with_dietary_preferences(["vegan"]);
//!     let result = orchestrator
//!         .analyze_or_get_cached(&items, &params, Some("session-1"))
//!         .await?;
//!     println!("{:?} cache_hit={}", result.product_name(), result.cache_hit);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`fingerprint`] | Content digest used as the dedup identity |
//! | [`types`] | Content items, variants and personalization parameters |
//! | [`cache`] | Fast cache client, keys and backends |
//! | [`resilience`] | Circuit breaker guarding the fast cache |
//! | [`store`] | Durable dedup store |
//! | [`config_cache`] | TTL cache over prompt versions |
//! | [`provider`] | Analysis provider trait, OpenAI implementation, prompt assembly |
//! | [`structured`] | Validated report built from provider JSON |
//! | [`tokens`] | Token usage and per-model pricing |
//! | [`telemetry`] | Usage metrics and sinks |
//! | [`orchestrator`] | The request flow tying everything together |
//! | [`config`] | YAML and environment settings |

pub mod cache;
pub mod config;
pub mod config_cache;
pub mod fingerprint;
pub mod orchestrator;
pub mod provider;
pub mod resilience;
pub mod store;
pub mod structured;
pub mod telemetry;
pub mod tokens;
pub mod types;

// Re-export main types for convenience
pub use config::Settings;
pub use fingerprint::{fingerprint, Fingerprint};
pub use orchestrator::{AnalysisOrchestrator, AnalysisOrchestratorBuilder, AnalysisResult};
pub use types::{AnalysisParams, AnalysisVariant, ContentItem};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

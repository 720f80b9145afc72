//! 弹性模式模块：为快速缓存后端提供熔断保护。
//!
//! # Resilience Primitives Module
//!
//! The fast cache is an optimization, never a correctness dependency. When its
//! backend keeps failing, the circuit breaker stops the orchestrator from paying
//! a timeout on every request.
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, failures are counted
//! - **Open**: Threshold reached, operations are skipped without a backend call
//! - **Half-Open**: Recovery timeout elapsed, a single trial is let through
//!
//! ```rust
//! use ai_analysis_core::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_recovery_timeout(Duration::from_secs(60));
//! let breaker = CircuitBreaker::new(config);
//!
//! if breaker.can_execute() {
//!     // Talk to the cache backend...
//!     breaker.record_success();
//! }
//! ```

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};

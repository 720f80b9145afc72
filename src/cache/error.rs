//! Fast-cache backend errors.
//!
//! These never leave the cache layer: [`super::FastCacheClient`] turns every one
//! of them into a miss or a failed write and feeds the circuit breaker.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache operation timed out")]
    Timeout,
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

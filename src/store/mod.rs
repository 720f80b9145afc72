//! 持久化去重存储模块：以请求键唯一约束保证每个请求最多一次成功写入。
//!
//! # Durable Dedup Store Module
//!
//! The durable store is the source of truth for analysis results. Its unique
//! constraint on the request key (`{fingerprint}:{variant}:{params_digest}`) is
//! the only authority resolving concurrent duplicate requests: of N racing
//! `create` calls for one key, exactly one succeeds and the rest fail with
//! [`StoreError::Conflict`]. No in-process lock is involved, so the guarantee
//! holds across processes sharing the store.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AnalysisStore`] | Trait for durable backends |
//! | [`AnalysisRecord`] | Persisted analysis |
//! | [`NewAnalysisRecord`] | Insert payload |
//! | [`MemoryAnalysisStore`] | In-process store with the same uniqueness semantics |
//! | `PgAnalysisStore` | PostgreSQL store (`postgres` feature) |

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryAnalysisStore;

use crate::fingerprint::Fingerprint;
use crate::types::AnalysisVariant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Another record already holds this request key.
    #[error("record already exists for key {key}")]
    Conflict { key: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store operation timed out")]
    Timeout,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A persisted analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    /// Unique identity: `{fingerprint}:{variant}:{params_digest}`.
    pub request_key: String,
    pub fingerprint: Fingerprint,
    pub variant: AnalysisVariant,
    pub session_ref: Option<String>,
    pub product_name: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysisRecord {
    pub request_key: String,
    pub fingerprint: Fingerprint,
    pub variant: AnalysisVariant,
    pub session_ref: Option<String>,
    pub product_name: Option<String>,
    pub payload: serde_json::Value,
}

impl NewAnalysisRecord {
    pub(crate) fn into_record(self) -> AnalysisRecord {
        let now = Utc::now();
        AnalysisRecord {
            id: Uuid::new_v4(),
            request_key: self.request_key,
            fingerprint: self.fingerprint,
            variant: self.variant,
            session_ref: self.session_ref,
            product_name: self.product_name,
            payload: self.payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable analysis backend.
///
/// `create` must enforce request-key uniqueness atomically (a unique index or
/// equivalent), never by a separate existence check.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn find_by_key(&self, request_key: &str) -> StoreResult<Option<AnalysisRecord>>;

    /// Every record for this content, newest first, across variants and
    /// parameter sets.
    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Vec<AnalysisRecord>>;

    async fn create(&self, record: NewAnalysisRecord) -> StoreResult<AnalysisRecord>;

    /// Most recent records for a session, newest first.
    async fn list_recent(&self, session_ref: &str, limit: usize) -> StoreResult<Vec<AnalysisRecord>>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<AnalysisRecord>>;

    fn name(&self) -> &'static str;
}

//! In-process analysis store.

use super::{AnalysisRecord, AnalysisStore, NewAnalysisRecord, StoreError, StoreResult};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, AnalysisRecord>,
    by_key: HashMap<String, Uuid>,
    /// Insertion order, oldest first.
    order: Vec<Uuid>,
}

/// Store with the same uniqueness semantics as the relational backend: the key
/// check and the insert happen under one write lock.
#[derive(Default)]
pub struct MemoryAnalysisStore {
    inner: RwLock<Inner>,
    conflicts: AtomicU64,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Rejected `create` calls so far.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub async fn records(&self) -> Vec<AnalysisRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn find_by_key(&self, request_key: &str) -> StoreResult<Option<AnalysisRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_key
            .get(request_key)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Vec<AnalysisRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|r| &r.fingerprint == fingerprint)
            .cloned()
            .collect())
    }

    async fn create(&self, record: NewAnalysisRecord) -> StoreResult<AnalysisRecord> {
        let mut inner = self.inner.write().await;
        if inner.by_key.contains_key(&record.request_key) {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Conflict {
                key: record.request_key,
            });
        }
        let record = record.into_record();
        inner.by_key.insert(record.request_key.clone(), record.id);
        inner.order.push(record.id);
        inner.by_id.insert(record.id, record.clone());
        debug!(id = %record.id, key = %record.request_key, "analysis record created");
        Ok(record)
    }

    async fn list_recent(&self, session_ref: &str, limit: usize) -> StoreResult<Vec<AnalysisRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|r| r.session_ref.as_deref() == Some(session_ref))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<AnalysisRecord>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::types::AnalysisVariant;
    use serde_json::json;
    use std::sync::Arc;

    fn new_record(content: &[u8], suffix: &str, session: Option<&str>) -> NewAnalysisRecord {
        let fp = fingerprint([content]);
        NewAnalysisRecord {
            request_key: format!("{}:complete:{}", fp, suffix),
            fingerprint: fp,
            variant: AnalysisVariant::Complete,
            session_ref: session.map(String::from),
            product_name: Some("Granola".into()),
            payload: json!({"product_info": {"name": "Granola"}}),
        }
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let store = MemoryAnalysisStore::new();
        let created = store.create(new_record(b"a", "default", None)).await.unwrap();
        let found = store.find_by_key(&created.request_key).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(store.get_by_id(created.id).await.unwrap(), Some(created));
        assert!(store.find_by_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_conflicts() {
        let store = MemoryAnalysisStore::new();
        store.create(new_record(b"a", "default", None)).await.unwrap();
        let err = store.create(new_record(b"a", "default", None)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.len().await, 1);
        assert_eq!(store.conflict_count(), 1);
    }

    #[tokio::test]
    async fn test_same_fingerprint_different_params() {
        let store = MemoryAnalysisStore::new();
        let first = store.create(new_record(b"a", "vegan", None)).await.unwrap();
        store.create(new_record(b"a", "keto", None)).await.unwrap();
        let all = store.find_by_fingerprint(&first.fingerprint).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].request_key.ends_with("keto"));
    }

    #[tokio::test]
    async fn test_concurrent_creates_single_winner() {
        let store = Arc::new(MemoryAnalysisStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(new_record(b"race", "default", None)).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.conflict_count(), 15);
    }

    #[tokio::test]
    async fn test_list_recent_by_session() {
        let store = MemoryAnalysisStore::new();
        store.create(new_record(b"1", "default", Some("s1"))).await.unwrap();
        store.create(new_record(b"2", "default", Some("s2"))).await.unwrap();
        store.create(new_record(b"3", "default", Some("s1"))).await.unwrap();
        let recent = store.list_recent("s1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].fingerprint, fingerprint([b"3"]));
        assert_eq!(store.list_recent("s1", 1).await.unwrap().len(), 1);
        assert!(store.list_recent("nobody", 10).await.unwrap().is_empty());
    }
}

//! Shared doubles for integration tests.
#![allow(dead_code)]

use ai_analysis_core::cache::{CacheBackend, CacheError, CacheResult};
use ai_analysis_core::fingerprint::Fingerprint;
use ai_analysis_core::provider::{AnalysisProvider, ProviderOutput};
use ai_analysis_core::store::{
    AnalysisRecord, AnalysisStore, MemoryAnalysisStore, NewAnalysisRecord, StoreError, StoreResult,
};
use ai_analysis_core::tokens::TokenUsage;
use ai_analysis_core::types::ContentItem;
use ai_analysis_core::{Error, ErrorContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

pub fn image(tag: &str) -> ContentItem {
    ContentItem::new(format!("image-bytes-{tag}").into_bytes(), "image/jpeg")
}

pub fn report_payload(name: &str) -> Value {
    json!({
        "product": {"name": name, "brand": "Acme"},
        "ingredients": ["oats", "sugar"],
        "nutritional_information": {
            "per_100g": {"calories": "380 kcal", "protein": "9 g", "sodium": "120mg"}
        },
        "general_rating": {"score": 6.0, "justification": "moderate sugar"},
        "confidence_score": 0.85
    })
}

pub enum Behavior {
    Succeed(Value),
    Fail(String),
    Hang,
}

/// Provider double: counts calls, records prompts, optionally waits at a
/// barrier so concurrent callers reach the store together.
pub struct ScriptedProvider {
    behavior: Behavior,
    model: String,
    usage: TokenUsage,
    barrier: Option<Arc<Barrier>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            model: "gpt-5.1-chat-latest".into(),
            usage: TokenUsage::new(2000, 1000),
            barrier: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed(report_payload("Oat Crunch")))
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    async fn analyze(&self, _items: &[ContentItem], prompt: &str) -> ai_analysis_core::Result<ProviderOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        match &self.behavior {
            Behavior::Succeed(payload) => Ok(ProviderOutput {
                payload: payload.clone(),
                usage: self.usage,
                model: self.model.clone(),
            }),
            Behavior::Fail(msg) => Err(Error::provider_with_context(
                msg.clone(),
                ErrorContext::new().with_source("scripted"),
            )),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("provider hang outlived the test")
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Cache backend that fails every operation.
pub struct FailingCache {
    pub calls: AtomicUsize,
}

impl FailingCache {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn fail<T>(&self) -> CacheResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Connection("connection refused".into()))
    }
}

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.fail()
    }
    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
        self.fail()
    }
    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        self.fail()
    }
    async fn delete_prefix(&self, _prefix: &str) -> CacheResult<u64> {
        self.fail()
    }
    async fn ping(&self) -> CacheResult<()> {
        self.fail()
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Memory store whose writes fail with a non-conflict error.
pub struct WriteFailingStore {
    pub inner: MemoryAnalysisStore,
}

impl WriteFailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryAnalysisStore::new(),
        }
    }
}

#[async_trait]
impl AnalysisStore for WriteFailingStore {
    async fn find_by_key(&self, request_key: &str) -> StoreResult<Option<AnalysisRecord>> {
        self.inner.find_by_key(request_key).await
    }
    async fn find_by_fingerprint(&self, fp: &Fingerprint) -> StoreResult<Vec<AnalysisRecord>> {
        self.inner.find_by_fingerprint(fp).await
    }
    async fn create(&self, _record: NewAnalysisRecord) -> StoreResult<AnalysisRecord> {
        Err(StoreError::Backend("disk full".into()))
    }
    async fn list_recent(&self, session_ref: &str, limit: usize) -> StoreResult<Vec<AnalysisRecord>> {
        self.inner.list_recent(session_ref, limit).await
    }
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<AnalysisRecord>> {
        self.inner.get_by_id(id).await
    }
    fn name(&self) -> &'static str {
        "write-failing"
    }
}

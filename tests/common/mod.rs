// tests/common/mod.rs
// Shared fakes and engine wiring for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use memfuse::db::{DocumentStore, InMemoryDocumentStore, StoreError, StoredDocument};
use memfuse::memory::{EmbeddingVector, InMemoryVectorStore, MemoryPayload, ScoredRecord, VectorFilter, VectorIndex, VectorRecord, VectorStoreError};
use memfuse::providers::{
    ChatMessage, CompletionOptions, EmbeddingConfig, EmbeddingError, EmbeddingProvider, HashEmbedder,
    LlmError, LlmProvider, SearchProviderError, StaticIdentityResolver, WebSearchHit, WebSearchProvider,
};
use memfuse::{EngineDeps, EngineSettings, MemoryEngine};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const TEST_DIMENSION: usize = 64;

pub fn hash_embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder::new(EmbeddingConfig {
        dimension: TEST_DIMENSION,
        ..EmbeddingConfig::default()
    }))
}

/// Replies are served in order; once the queue is empty the fallback reply is used.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(fallback.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Err(LlmError::ConnectionFailed("connection refused".into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, reply: &str) -> Self {
        self.replies.lock().push_back(Ok(reply.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, _messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Hash embeddings that start failing after `ok_calls` successful calls.
pub struct FlakyEmbedder {
    inner: Arc<HashEmbedder>,
    ok_calls: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(ok_calls: usize) -> Self {
        Self {
            inner: hash_embedder(),
            ok_calls,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.ok_calls {
            return Err(EmbeddingError::Request("embedding service unavailable".into()));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

/// Every call waits for a permit, so tests control when chunks finish.
pub struct GatedEmbedder {
    inner: Arc<HashEmbedder>,
    pub gate: Arc<Semaphore>,
}

impl GatedEmbedder {
    pub fn new() -> Self {
        Self {
            inner: hash_embedder(),
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        permit.forget();
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

/// Web search returning fixed hits and counting calls.
pub struct FakeWebSearch {
    hits: Vec<WebSearchHit>,
    calls: AtomicUsize,
}

impl FakeWebSearch {
    pub fn new(hits: Vec<WebSearchHit>) -> Self {
        Self {
            hits,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchProvider for FakeWebSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebSearchHit>, SearchProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FailingWebSearch;

#[async_trait]
impl WebSearchProvider for FailingWebSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebSearchHit>, SearchProviderError> {
        Err(SearchProviderError::Status(503))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn web_hit(title: &str, snippet: &str) -> WebSearchHit {
    WebSearchHit {
        title: title.to_string(),
        snippet: snippet.to_string(),
        url: format!("https://example.com/{}", title.to_lowercase().replace(' ', "-")),
    }
}

/// Vector index that answers every search with fixed scored records.
pub struct FixedVectorIndex {
    hits: Vec<ScoredRecord>,
}

impl FixedVectorIndex {
    pub fn new(hits: Vec<ScoredRecord>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl VectorIndex for FixedVectorIndex {
    async fn upsert(
        &self,
        _collection: &str,
        _id: &str,
        _vector: EmbeddingVector,
        _payload: MemoryPayload,
    ) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        Ok(self
            .hits
            .iter()
            .filter(|h| filter.matches(&h.payload))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list(&self, _collection: &str, _filter: &VectorFilter) -> Result<Vec<VectorRecord>, VectorStoreError> {
        Ok(Vec::new())
    }
}

pub fn memory_payload(owner_id: &str, content: &str) -> MemoryPayload {
    MemoryPayload {
        owner_id: owner_id.to_string(),
        agent_scope: "universe".to_string(),
        filename: "notes.txt".to_string(),
        chunk_index: 0,
        content: content.to_string(),
        summary: String::new(),
        job_id: None,
        source_type: "document".to_string(),
        created_at: chrono::Utc::now(),
    }
}

/// Document store wrapper that records every body written to one collection
/// and can be told to reject conditional writes.
pub struct RecordingStore {
    inner: InMemoryDocumentStore,
    watched: String,
    writes: Mutex<Vec<Value>>,
    conflicts_left: AtomicUsize,
}

impl RecordingStore {
    pub fn watching(collection: &str) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            watched: collection.to_string(),
            writes: Mutex::new(Vec::new()),
            conflicts_left: AtomicUsize::new(0),
        }
    }

    /// The next `n` conditional writes fail with a version conflict.
    pub fn with_conflicts(self, n: usize) -> Self {
        self.conflicts_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> Vec<Value> {
        self.writes.lock().clone()
    }

    fn observe(&self, collection: &str, body: &Value) {
        if collection == self.watched {
            self.writes.lock().push(body.clone());
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64, StoreError> {
        self.observe(collection, &body);
        self.inner.put(collection, id, body).await
    }

    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<u64, StoreError> {
        let injected = self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: expected_version,
                found: expected_version + 1,
            });
        }
        self.observe(collection, &body);
        self.inner.put_if_version(collection, id, expected_version, body).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.inner.list(collection).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }
}

/// Document store whose reads or writes to one collection always fail.
pub struct FaultyStore {
    inner: InMemoryDocumentStore,
    collection: String,
    fail_reads: bool,
    fail_writes: bool,
}

impl FaultyStore {
    pub fn failing_writes(collection: &str) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            collection: collection.to_string(),
            fail_reads: false,
            fail_writes: true,
        }
    }

    pub fn failing_reads(collection: &str) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            collection: collection.to_string(),
            fail_reads: true,
            fail_writes: false,
        }
    }

    fn check(&self, collection: &str, failing: bool) -> Result<(), StoreError> {
        if failing && collection == self.collection {
            return Err(StoreError::Unavailable(format!("{} is offline", collection)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.check(collection, self.fail_reads)?;
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64, StoreError> {
        self.check(collection, self.fail_writes)?;
        self.inner.put(collection, id, body).await
    }

    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<u64, StoreError> {
        self.check(collection, self.fail_writes)?;
        self.inner.put_if_version(collection, id, expected_version, body).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.check(collection, self.fail_reads)?;
        self.inner.list(collection).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check(collection, self.fail_writes)?;
        self.inner.delete(collection, id).await
    }
}

/// In-memory collaborators with a scripted LLM, hashed embeddings, a fake web
/// provider and one known user (`alice@example.com` -> `alice`).
pub fn test_deps(llm: Arc<dyn LlmProvider>) -> EngineDeps {
    EngineDeps {
        store: Arc::new(InMemoryDocumentStore::new()),
        vectors: Arc::new(InMemoryVectorStore::new()),
        embedder: hash_embedder(),
        llm,
        web: Arc::new(FakeWebSearch::new(vec![
            web_hit("Rust Book", "Ownership rules in Rust"),
            web_hit("Tokio Guide", "Async runtime for Rust"),
        ])),
        identity: Arc::new(StaticIdentityResolver::new().with_user("alice@example.com", "alice")),
    }
}

pub fn engine(deps: EngineDeps) -> MemoryEngine {
    MemoryEngine::new(deps, EngineSettings::default())
}

/// Text of roughly `len` characters made of short sentences.
pub fn document(len: usize) -> String {
    let sentence = "Memory chunks are embedded and indexed for retrieval. ";
    sentence.repeat(len / sentence.len() + 1).chars().take(len).collect()
}

//! Vector index for memory chunks.
//!
//! Records live in named collections and carry a [`MemoryPayload`] so that
//! searches can be scoped to one owner and agent scope. The in-memory
//! implementation optionally snapshots itself to disk on `flush`.

use crate::memory::persistence::{self, PersistenceError, VectorStoreSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub type EmbeddingVector = Vec<f32>;

/// Metadata stored next to every vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryPayload {
    pub owner_id: String,
    pub agent_scope: String,
    pub filename: String,
    pub chunk_index: usize,
    pub content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    pub created_at: DateTime<Utc>,
}

fn default_source_type() -> String {
    "document".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: EmbeddingVector,
    pub payload: MemoryPayload,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub payload: MemoryPayload,
}

/// Equality filter over payload fields. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub owner_id: Option<String>,
    pub agent_scope: Option<String>,
    pub filename: Option<String>,
}

impl VectorFilter {
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, agent_scope: impl Into<String>) -> Self {
        self.agent_scope = Some(agent_scope.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn matches(&self, payload: &MemoryPayload) -> bool {
        self.owner_id.as_deref().map_or(true, |v| v == payload.owner_id)
            && self.agent_scope.as_deref().map_or(true, |v| v == payload.agent_scope)
            && self.filename.as_deref().map_or(true, |v| v == payload.filename)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("invalid vector dimension: expected {expected}, found {found}")]
    InvalidDimension { expected: usize, found: usize },
    #[error("storage failed: {0}")]
    Storage(String),
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
}

impl From<PersistenceError> for VectorStoreError {
    fn from(err: PersistenceError) -> Self {
        VectorStoreError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a record. Re-upserting the same id is idempotent.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: EmbeddingVector,
        payload: MemoryPayload,
    ) -> Result<(), VectorStoreError>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError>;

    async fn list(
        &self,
        collection: &str,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorRecord>, VectorStoreError>;

    /// Make previously upserted records durable.
    async fn flush(&self, _collection: &str) -> Result<(), VectorStoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Collection {
    records: Vec<VectorRecord>,
    index_map: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl Collection {
    fn upsert(&mut self, record: VectorRecord) -> Result<(), VectorStoreError> {
        let found = record.vector.len();
        match self.dimension {
            Some(expected) if expected != found => {
                return Err(VectorStoreError::InvalidDimension { expected, found });
            }
            None => self.dimension = Some(found),
            _ => {}
        }

        if let Some(idx) = self.index_map.get(&record.id) {
            self.records[*idx] = record;
            return Ok(());
        }

        self.index_map.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub collections: usize,
    pub total_records: usize,
}

/// Brute-force cosine index held in memory.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    snapshot_path: Option<PathBuf>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Create a store that writes a JSON snapshot on every flush, loading
    /// the existing snapshot first if there is one.
    pub async fn with_snapshot<P: Into<PathBuf>>(path: P) -> Result<Self, VectorStoreError> {
        let path = path.into();
        let mut collections: HashMap<String, Collection> = HashMap::new();

        if path.exists() {
            let snapshot = persistence::load_snapshot(&path).await?;
            let mut loaded = 0usize;
            for (name, records) in snapshot.collections {
                let collection = collections.entry(name).or_default();
                for record in records {
                    collection.upsert(record)?;
                    loaded += 1;
                }
            }
            info!(path = ?path, records = loaded, "Vector snapshot loaded");
        }

        Ok(Self {
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
        })
    }

    pub async fn stats(&self) -> StoreStats {
        let guard = self.collections.read().await;
        StoreStats {
            collections: guard.len(),
            total_records: guard.values().map(|c| c.records.len()).sum(),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: EmbeddingVector,
        payload: MemoryPayload,
    ) -> Result<(), VectorStoreError> {
        debug!(collection = %collection, id = %id, "Upserting vector record");
        let mut guard = self.collections.write().await;
        guard.entry(collection.to_string()).or_default().upsert(VectorRecord {
            id: id.to_string(),
            vector,
            payload,
        })
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let guard = self.collections.read().await;
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredRecord> = coll
            .records
            .iter()
            .filter(|r| filter.matches(&r.payload))
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                payload: r.payload.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        debug!(collection = %collection, results_count = results.len(), "Vector search done");
        Ok(results)
    }

    async fn list(
        &self,
        collection: &str,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorRecord>, VectorStoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|c| {
                c.records
                    .iter()
                    .filter(|r| filter.matches(&r.payload))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn flush(&self, collection: &str) -> Result<(), VectorStoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let snapshot = {
            let guard = self.collections.read().await;
            VectorStoreSnapshot::new(
                guard
                    .iter()
                    .map(|(name, c)| (name.clone(), c.records.clone()))
                    .collect(),
            )
        };

        persistence::save_snapshot(&snapshot, path).await.map_err(|e| {
            warn!(collection = %collection, error = %e, "Vector snapshot write failed");
            VectorStoreError::from(e)
        })
    }
}

/// Cosine similarity between two vectors. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(owner: &str, scope: &str, content: &str) -> MemoryPayload {
        MemoryPayload {
            owner_id: owner.to_string(),
            agent_scope: scope.to_string(),
            filename: "notes.txt".to_string(),
            chunk_index: 0,
            content: content.to_string(),
            summary: String::new(),
            job_id: None,
            source_type: "document".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_respects_owner_filter() {
        let store = InMemoryVectorStore::new();
        store
            .upsert("memories", "a", vec![1.0, 0.0], payload("u1", "universe", "alpha"))
            .await
            .unwrap();
        store
            .upsert("memories", "b", vec![1.0, 0.1], payload("u2", "universe", "beta"))
            .await
            .unwrap();

        let hits = store
            .search("memories", &[1.0, 0.0], &VectorFilter::for_owner("u1"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.content, "alpha");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryVectorStore::new();
        for _ in 0..3 {
            store
                .upsert("memories", "a", vec![0.5, 0.5], payload("u1", "s", "same"))
                .await
                .unwrap();
        }
        assert_eq!(store.stats().await.total_records, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryVectorStore::new();
        store
            .upsert("memories", "a", vec![1.0, 0.0], payload("u1", "s", "x"))
            .await
            .unwrap();
        let err = store
            .upsert("memories", "b", vec![1.0, 0.0, 0.0], payload("u1", "s", "y"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidDimension { expected: 2, found: 3 }));
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert("m", "far", vec![0.0, 1.0], payload("u1", "s", "far"))
            .await
            .unwrap();
        store
            .upsert("m", "near", vec![1.0, 0.1], payload("u1", "s", "near"))
            .await
            .unwrap();

        let hits = store
            .search("m", &[1.0, 0.0], &VectorFilter::default(), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn test_snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");

        let store = InMemoryVectorStore::with_snapshot(&path).await.unwrap();
        store
            .upsert("m", "a", vec![1.0, 0.0], payload("u1", "s", "kept"))
            .await
            .unwrap();
        store.flush("m").await.unwrap();

        let reloaded = InMemoryVectorStore::with_snapshot(&path).await.unwrap();
        let records = reloaded.list("m", &VectorFilter::for_owner("u1")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload.content, "kept");
    }
}

// src/providers/embedder.rs
// Embedding providers: local hashed bag-of-words and Ollama-backed

use crate::memory::vector_store::EmbeddingVector;
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;
    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub dimension: usize,
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            cache_size: 10_000,
        }
    }
}

/// Deterministic embedder that hashes lowercase tokens into a fixed number
/// of buckets and L2-normalizes the result. Needs no model, so texts that
/// share vocabulary end up close in cosine space.
pub struct HashEmbedder {
    config: EmbeddingConfig,
    cache: Mutex<LruCache<u64, EmbeddingVector>>,
}

impl HashEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        info!(
            dimension = config.dimension,
            cache_size = config.cache_size,
            "Initializing HashEmbedder"
        );
        Self {
            config,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EmbeddingConfig::default())
    }

    fn compute(&self, text: &str) -> EmbeddingVector {
        let dim = self.config.dimension.max(1);
        let mut vec = vec![0.0f32; dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = seahash::hash(token.to_lowercase().as_bytes());
            let idx = (hash % dim as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vec[idx] += sign;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let key = seahash::hash(text.as_bytes());

        {
            let mut cache = self.cache.lock().await;
            if let Some(embedding) = cache.get(&key) {
                debug!(cache_key = key, text_len = text.len(), "Cache hit for embedding");
                return Ok(embedding.clone());
            }
        }

        let embedding = self.compute(text);
        self.cache.lock().await.put(key, embedding.clone());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// Embeddings served by a local Ollama instance.
pub struct OllamaEmbedder {
    url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(url: String, model: String, dimension: usize) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            dimension,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        debug!(model = %self.model, text_len = text.len(), "Embedding with Ollama");

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.url))
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if body.embedding.len() != self.dimension {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                body.embedding.len()
            )));
        }

        Ok(body.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

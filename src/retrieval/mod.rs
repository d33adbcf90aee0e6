// src/retrieval/mod.rs
// Hybrid retrieval: score fusion, context rendering

pub mod context;
pub mod hybrid;
pub mod scoring;

pub use context::{format_fused_context, EMPTY_CONTEXT};
pub use hybrid::{FusionConfig, HybridFuser, HybridResult, HybridSearchResponse, MemoryHit};
pub use scoring::{fused_score, FusionWeights, RankDecay, ResultSource, EXTERNAL_ID_PREFIX};

use crate::memory::vector_store::VectorStoreError;
use crate::providers::EmbeddingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid search request: {0}")]
    Validation(String),
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("vector search failed: {0}")]
    VectorStore(#[from] VectorStoreError),
}

// src/memory/mod.rs

pub mod chunker;
pub mod persistence;
pub mod vector_store;

pub use chunker::{chunk_text, ChunkerConfig, TextChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use persistence::{load_snapshot, save_snapshot, PersistenceError, VectorStoreSnapshot};
pub use vector_store::{
    cosine_similarity, EmbeddingVector, InMemoryVectorStore, MemoryPayload, ScoredRecord, StoreStats,
    VectorFilter, VectorIndex, VectorRecord, VectorStoreError,
};

pub mod job;
pub mod pipeline;
pub mod registry;

pub use job::{ProcessingJob, ProcessingStatus};
pub use pipeline::{IngestRequest, IngestionPipeline, JobHandle, PipelineConfig, DEFAULT_MEMORY_COLLECTION};
pub use registry::{JobRegistry, JOBS_COLLECTION};

use crate::memory::vector_store::VectorStoreError;
use crate::providers::EmbeddingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingestion request: {0}")]
    Validation(String),
    #[error("No chunks generated from content")]
    NoChunks,
    #[error("cancelled after {processed} chunks")]
    Cancelled { processed: usize },
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("indexing failed: {0}")]
    Indexing(#[from] VectorStoreError),
    #[error("job {job_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },
    #[error("unknown job: {0}")]
    UnknownJob(String),
}

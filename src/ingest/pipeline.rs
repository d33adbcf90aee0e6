//! Background ingestion: chunk, summarize, embed and index a document while
//! publishing progress through the job registry.

use super::job::{ProcessingJob, ProcessingStatus};
use super::registry::JobRegistry;
use super::IngestError;
use crate::memory::chunker::{chunk_text, ChunkerConfig};
use crate::memory::vector_store::{MemoryPayload, VectorIndex};
use crate::monitoring::metrics::{
    CHUNKS_INDEXED_TOTAL, JOBS_COMPLETED_TOTAL, JOBS_FAILED_TOTAL, JOBS_STARTED_TOTAL,
    SUMMARY_FALLBACKS_TOTAL,
};
use crate::providers::{ChatMessage, CompletionOptions, EmbeddingProvider, LlmProvider};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_MEMORY_COLLECTION: &str = "memories";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a summarization assistant. Provide concise, \
information-dense summaries that preserve key facts and concepts.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub chunker: ChunkerConfig,
    pub summary_max_words: usize,
    pub summary_fallback_chars: usize,
    pub collection: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            summary_max_words: 150,
            summary_fallback_chars: 150,
            collection: DEFAULT_MEMORY_COLLECTION.to_string(),
        }
    }
}

/// Request to ingest one document.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub content: String,
    pub filename: String,
    pub owner_id: String,
    pub agent_scope: String,
}

/// Handle to a running job. Dropping it does not stop the job.
pub struct JobHandle {
    pub job: ProcessingJob,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<Option<ProcessingJob>>,
    registry: Arc<JobRegistry>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Ask the worker to stop before its next chunk. The job ends FAILED.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Wait for the worker to finish and return the final job record.
    /// Falls back to the registry when the worker could not report one.
    pub async fn wait(self) -> Option<ProcessingJob> {
        match self.task.await {
            Ok(Some(job)) => return Some(job),
            Ok(None) => {}
            Err(e) => error!(job_id = %self.job.id, error = %e, "Ingestion task panicked or was aborted"),
        }
        self.registry.get_job(&self.job.id).await
    }
}

struct PipelineInner {
    config: PipelineConfig,
    registry: Arc<JobRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    vectors: Arc<dyn VectorIndex>,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    inner: Arc<PipelineInner>,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<JobRegistry>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        vectors: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner { config, registry, embedder, llm, vectors }),
        }
    }

    /// Create a job, persist it as PENDING and start processing in the
    /// background. Returns as soon as the job exists.
    pub async fn start_pipeline(&self, request: IngestRequest) -> Result<JobHandle, IngestError> {
        for (field, value) in [
            ("filename", &request.filename),
            ("ownerId", &request.owner_id),
            ("agentScope", &request.agent_scope),
        ] {
            if value.trim().is_empty() {
                return Err(IngestError::Validation(format!("{} must not be empty", field)));
            }
        }

        let job = ProcessingJob::new(
            Uuid::new_v4().to_string(),
            request.owner_id.clone(),
            request.agent_scope.clone(),
            request.filename.clone(),
        );
        self.inner.registry.insert(job.clone()).await;
        JOBS_STARTED_TOTAL.inc();

        info!(
            job_id = %job.id,
            owner_id = %job.owner_id,
            filename = %job.filename,
            content_len = request.content.len(),
            "Ingestion job started"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let worker = self.inner.clone();
        let job_id = job.id.clone();
        let worker_cancel = cancel.clone();
        let task = tokio::spawn(async move { worker.process(&job_id, request, worker_cancel).await });

        Ok(JobHandle {
            job,
            cancel,
            task,
            registry: self.inner.registry.clone(),
        })
    }

    pub async fn get_job(&self, job_id: &str) -> Option<ProcessingJob> {
        self.inner.registry.get_job(job_id).await
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }
}

impl PipelineInner {
    /// Run the job to a terminal state and return the final record.
    async fn process(&self, job_id: &str, request: IngestRequest, cancel: Arc<AtomicBool>) -> Option<ProcessingJob> {
        let start = Instant::now();
        match self.run(job_id, &request, &cancel).await {
            Ok(job) => {
                JOBS_COMPLETED_TOTAL.inc();
                info!(
                    job_id = %job_id,
                    chunks = job.total_chunks,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Ingestion job completed"
                );
                Some(job)
            }
            Err(e) => {
                JOBS_FAILED_TOTAL.inc();
                error!(job_id = %job_id, error = %e, "Ingestion job failed");
                let message = e.to_string();
                match self.registry.update(job_id, |j| j.fail(message)).await {
                    Ok(job) => Some(job),
                    Err(update_err) => {
                        warn!(job_id = %job_id, error = %update_err, "Could not mark job failed");
                        None
                    }
                }
            }
        }
    }

    async fn run(
        &self,
        job_id: &str,
        request: &IngestRequest,
        cancel: &AtomicBool,
    ) -> Result<ProcessingJob, IngestError> {
        self.registry
            .update(job_id, |j| j.advance(ProcessingStatus::Chunking))
            .await?;

        let chunks = chunk_text(
            &request.content,
            self.config.chunker.chunk_size,
            self.config.chunker.chunk_overlap,
        );
        let total = chunks.len();
        debug!(job_id = %job_id, total_chunks = total, "Chunking done");

        self.registry
            .update(job_id, |j| j.set_total_chunks(total))
            .await?;
        if total == 0 {
            return Err(IngestError::NoChunks);
        }

        self.registry
            .update(job_id, |j| j.advance(ProcessingStatus::Embedding))
            .await?;

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                return Err(IngestError::Cancelled { processed: index });
            }

            let summary = self.summarize(chunk).await;
            let vector = self.embedder.embed(chunk).await?;

            let payload = MemoryPayload {
                owner_id: request.owner_id.clone(),
                agent_scope: request.agent_scope.clone(),
                filename: request.filename.clone(),
                chunk_index: index,
                content: chunk.clone(),
                summary,
                job_id: Some(job_id.to_string()),
                source_type: "document".to_string(),
                created_at: Utc::now(),
            };
            self.vectors
                .upsert(&self.config.collection, &format!("{}_{}", job_id, index), vector, payload)
                .await?;

            CHUNKS_INDEXED_TOTAL.inc();
            self.registry
                .update(job_id, |j| j.record_progress(index + 1))
                .await?;
        }

        self.registry
            .update(job_id, |j| j.advance(ProcessingStatus::Indexing))
            .await?;
        self.vectors.flush(&self.config.collection).await?;
        self.registry
            .update(job_id, |j| j.advance(ProcessingStatus::Completed))
            .await
    }

    /// Summarize a chunk. Falls back to a prefix of the chunk on any failure.
    async fn summarize(&self, chunk: &str) -> String {
        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Summarize the following text in under {} words, focusing on key concepts and information:\n\n{}",
                self.config.summary_max_words, chunk
            )),
        ];
        let options = CompletionOptions {
            temperature: 0.3,
            max_tokens: None,
            json_output: false,
        };

        match self.llm.complete(&messages, &options).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                SUMMARY_FALLBACKS_TOTAL.inc();
                fallback_summary(chunk, self.config.summary_fallback_chars)
            }
            Err(e) => {
                SUMMARY_FALLBACKS_TOTAL.inc();
                warn!(error = %e, "Summarization failed, using prefix");
                fallback_summary(chunk, self.config.summary_fallback_chars)
            }
        }
    }
}

/// First `max_chars` characters followed by "...".
pub fn fallback_summary(chunk: &str, max_chars: usize) -> String {
    let prefix: String = chunk.chars().take(max_chars).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_summary_is_char_safe() {
        assert_eq!(fallback_summary("abcdef", 3), "abc...");
        assert_eq!(fallback_summary("żółw", 2), "żó...");
        assert_eq!(fallback_summary("ab", 10), "ab...");
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunker.chunk_size, 4000);
        assert_eq!(config.chunker.chunk_overlap, 200);
        assert_eq!(config.summary_max_words, 150);
        assert_eq!(config.collection, "memories");
    }
}

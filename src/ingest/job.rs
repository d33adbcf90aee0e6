//! Processing job record and its status machine.
//!
//! `PENDING -> CHUNKING -> EMBEDDING -> INDEXING -> COMPLETED`, with `FAILED`
//! reachable from any non-terminal status. Status never moves backwards and
//! `processed_chunks` never decreases.

use super::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Chunking,
    Embedding,
    Indexing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Chunking => 1,
            Self::Embedding => 2,
            Self::Indexing => 3,
            Self::Completed | Self::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Chunking => "CHUNKING",
            Self::Embedding => "EMBEDDING",
            Self::Indexing => "INDEXING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub id: String,
    pub owner_id: String,
    pub agent_scope: String,
    pub filename: String,
    pub status: ProcessingStatus,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(id: String, owner_id: String, agent_scope: String, filename: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            agent_scope,
            filename,
            status: ProcessingStatus::Pending,
            total_chunks: 0,
            processed_chunks: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a later status. Re-entering the current status is a no-op.
    pub fn advance(&mut self, next: ProcessingStatus) -> Result<(), IngestError> {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return Err(self.transition_error(next));
        }
        if next == ProcessingStatus::Completed && self.processed_chunks != self.total_chunks {
            return Err(self.transition_error(next));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn set_total_chunks(&mut self, total: usize) -> Result<(), IngestError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(self.status));
        }
        self.total_chunks = total;
        self.touch();
        Ok(())
    }

    /// Record progress. Lower values than already recorded are ignored.
    pub fn record_progress(&mut self, processed: usize) -> Result<(), IngestError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(self.status));
        }
        self.processed_chunks = self.processed_chunks.max(processed.min(self.total_chunks));
        self.touch();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), IngestError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(ProcessingStatus::Failed));
        }
        self.status = ProcessingStatus::Failed;
        self.error = Some(message.into());
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn transition_error(&self, to: ProcessingStatus) -> IngestError {
        IngestError::InvalidTransition {
            job_id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}

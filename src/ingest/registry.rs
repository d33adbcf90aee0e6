//! Job registry: an in-process map of the jobs this process is still running,
//! backed by the document store so other processes can observe progress.
//! Finished jobs leave the map; the store stays the record of them.

use super::job::ProcessingJob;
use super::IngestError;
use crate::db::{self, DocumentStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const JOBS_COLLECTION: &str = "processing_jobs";

pub struct JobRegistry {
    local: RwLock<HashMap<String, ProcessingJob>>,
    store: Arc<dyn DocumentStore>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            store,
        }
    }

    pub async fn insert(&self, job: ProcessingJob) {
        self.local.write().insert(job.id.clone(), job.clone());
        self.persist(&job).await;
    }

    /// Apply a mutation to a locally owned job and persist the result.
    /// The local copy only changes if the mutation succeeds, and is dropped
    /// once the job reaches a terminal state.
    pub async fn update<F>(&self, job_id: &str, mutate: F) -> Result<ProcessingJob, IngestError>
    where
        F: FnOnce(&mut ProcessingJob) -> Result<(), IngestError>,
    {
        let updated = {
            let mut guard = self.local.write();
            let job = guard
                .get_mut(job_id)
                .ok_or_else(|| IngestError::UnknownJob(job_id.to_string()))?;
            let mut next = job.clone();
            mutate(&mut next)?;
            if next.status.is_terminal() {
                guard.remove(job_id);
            } else {
                *job = next.clone();
            }
            next
        };

        self.persist(&updated).await;
        Ok(updated)
    }

    /// Local map first, then the durable store. Store misses and store
    /// errors both read as "not found".
    pub async fn get_job(&self, job_id: &str) -> Option<ProcessingJob> {
        let local = self.local.read().get(job_id).cloned();
        if local.is_some() {
            return local;
        }

        match db::load::<ProcessingJob>(self.store.as_ref(), JOBS_COLLECTION, job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to read job from store");
                None
            }
        }
    }

    /// Number of jobs still held in memory.
    pub fn active_jobs(&self) -> usize {
        self.local.read().len()
    }

    async fn persist(&self, job: &ProcessingJob) {
        match db::save(self.store.as_ref(), JOBS_COLLECTION, &job.id, job).await {
            Ok(version) => debug!(job_id = %job.id, status = %job.status, version, "Job persisted"),
            Err(e) => warn!(
                job_id = %job.id,
                status = %job.status,
                error = %e,
                "Failed to persist job progress; continuing"
            ),
        }
    }
}

// src/memory/persistence.rs
// Persistence layer: save/load vector snapshots to disk

use crate::memory::vector_store::VectorRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Serializable snapshot of every vector collection
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorStoreSnapshot {
    pub collections: HashMap<String, Vec<VectorRecord>>,
    pub version: u32,
    pub timestamp: i64,
}

impl VectorStoreSnapshot {
    pub fn new(collections: HashMap<String, Vec<VectorRecord>>) -> Self {
        Self {
            collections,
            version: 1,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(|r| r.len()).sum()
    }
}

/// Persistence error types
#[derive(Debug)]
pub enum PersistenceError {
    SerializationError(String),
    IoError(String),
    NotFound(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::IoError(msg) => write!(f, "IO error: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::IoError(err.to_string())
    }
}

/// Write a snapshot as JSON. Writes to a sibling temp file first, then renames.
pub async fn save_snapshot<P: AsRef<Path>>(
    snapshot: &VectorStoreSnapshot,
    path: P,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    debug!(path = ?path, "Saving vector snapshot");

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;

    info!(path = ?path, records = snapshot.record_count(), "Vector snapshot saved");
    Ok(())
}

/// Read a snapshot from JSON.
pub async fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<VectorStoreSnapshot, PersistenceError> {
    let path = path.as_ref();
    debug!(path = ?path, "Loading vector snapshot");

    if !path.exists() {
        return Err(PersistenceError::NotFound(format!(
            "Vector snapshot not found: {:?}",
            path
        )));
    }

    let json = std::fs::read_to_string(path)?;
    let snapshot: VectorStoreSnapshot = serde_json::from_str(&json)?;
    Ok(snapshot)
}

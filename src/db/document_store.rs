//! Versioned document storage using JSON blobs.
//!
//! Every record the engine persists (jobs, learning state, feedback,
//! performance metrics, sessions, cached external results) is stored as a
//! JSON body keyed by `(collection, id)`. Each write bumps a per-document
//! version so read-modify-write cycles can be made conditional.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("version conflict on {collection}/{id}: expected {expected}, found {found}")]
    VersionConflict {
        collection: String,
        id: String,
        expected: u64,
        found: u64,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored JSON body together with its write version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub version: u64,
    pub body: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;

    /// Unconditional write. Returns the new version.
    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64>;

    /// Conditional write. `expected_version == 0` means the document must not exist yet.
    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<u64>;

    /// All documents in a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;
}

/// Load and deserialize a document. Returns None if it doesn't exist.
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(collection, id).await? {
        Some(doc) => Ok(Some(decode(doc.body)?)),
        None => Ok(None),
    }
}

/// Load a document together with its version.
pub async fn load_versioned<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<(u64, T)>> {
    match store.get(collection, id).await? {
        Some(doc) => Ok(Some((doc.version, decode(doc.body)?))),
        None => Ok(None),
    }
}

/// Serialize and save a document unconditionally.
pub async fn save<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    value: &T,
) -> Result<u64> {
    store.put(collection, id, encode(value)?).await
}

/// Load every document of a collection, deserialized.
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<T>> {
    store
        .list(collection)
        .await?
        .into_iter()
        .map(|doc| decode(doc.body))
        .collect()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Process-local store. Used by tests and as a fallback when no database path is configured.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, (u64, Value)>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let guard = self.collections.read();
        Ok(guard
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|(version, body)| StoredDocument {
                id: id.to_string(),
                version: *version,
                body: body.clone(),
            }))
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64> {
        let mut guard = self.collections.write();
        let docs = guard.entry(collection.to_string()).or_default();
        let version = docs.get(id).map(|(v, _)| v + 1).unwrap_or(1);
        docs.insert(id.to_string(), (version, body));
        Ok(version)
    }

    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<u64> {
        let mut guard = self.collections.write();
        let docs = guard.entry(collection.to_string()).or_default();
        let found = docs.get(id).map(|(v, _)| *v).unwrap_or(0);
        if found != expected_version {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: expected_version,
                found,
            });
        }
        docs.insert(id.to_string(), (found + 1, body));
        Ok(found + 1)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let guard = self.collections.read();
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, (version, body))| StoredDocument {
                        id: id.clone(),
                        version: *version,
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut guard = self.collections.write();
        Ok(guard
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }
}

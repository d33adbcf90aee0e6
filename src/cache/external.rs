// src/cache/external.rs
// TTL cache for web search results, stored in the document store

use crate::db::{self, DocumentStore, StoreError};
use crate::providers::WebSearchHit;
use crate::retrieval::scoring::RankDecay;
use crate::time_window;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const EXTERNAL_CACHE_COLLECTION: &str = "external_knowledge";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: String,
    pub normalized_query: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub confidence: f64,
    pub rank: usize,
    pub batch_id: String,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }
}

/// Lowercase, trim and collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lookups scan the whole collection, so their cost grows with everything
/// cached. Nothing prunes on its own: run `prune_expired` periodically
/// (`memfuse prune-cache` from cron or similar).
pub struct ExternalResultCache {
    store: Arc<dyn DocumentStore>,
    decay: RankDecay,
    source: String,
}

impl ExternalResultCache {
    pub fn new(store: Arc<dyn DocumentStore>, decay: RankDecay) -> Self {
        Self {
            store,
            decay,
            source: "web".to_string(),
        }
    }

    /// Entries of the newest non-expired batch for this query, best rank first.
    /// An entry exactly `max_age_hours` old still counts as fresh.
    pub async fn get_cached(&self, query: &str, max_age_hours: u64) -> Result<Vec<CacheEntry>, StoreError> {
        self.get_cached_at(query, max_age_hours, Utc::now()).await
    }

    pub async fn get_cached_at(
        &self,
        query: &str,
        max_age_hours: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let normalized = normalize_query(query);
        let max_age = time_window::hours(max_age_hours);

        let fresh: Vec<CacheEntry> = self
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.normalized_query == normalized && e.age(now) <= max_age)
            .collect();

        let newest_batch = fresh
            .iter()
            .max_by_key(|e| e.cached_at)
            .map(|e| e.batch_id.clone());

        let mut batch: Vec<CacheEntry> = match newest_batch {
            Some(batch_id) => fresh.into_iter().filter(|e| e.batch_id == batch_id).collect(),
            None => Vec::new(),
        };
        batch.sort_by_key(|e| e.rank);

        debug!(query = %normalized, hits = batch.len(), "External cache lookup");
        Ok(batch)
    }

    /// Store one batch of provider hits captured now.
    pub async fn write(&self, query: &str, hits: &[WebSearchHit]) -> Result<usize, StoreError> {
        self.write_at(query, hits, Utc::now()).await
    }

    /// Store one batch of provider hits with an explicit capture time.
    pub async fn write_at(
        &self,
        query: &str,
        hits: &[WebSearchHit],
        captured_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let normalized = normalize_query(query);
        if hits.is_empty() || normalized.is_empty() {
            return Ok(0);
        }
        let batch_id = Uuid::new_v4().to_string();

        for (rank, hit) in hits.iter().enumerate() {
            let entry = CacheEntry {
                id: format!("{}_{}", batch_id, rank),
                normalized_query: normalized.clone(),
                source: self.source.clone(),
                title: hit.title.clone(),
                url: hit.url.clone(),
                content: hit.snippet.clone(),
                confidence: self.decay.confidence(rank),
                rank,
                batch_id: batch_id.clone(),
                cached_at: captured_at,
            };
            db::save(self.store.as_ref(), EXTERNAL_CACHE_COLLECTION, &entry.id, &entry).await?;
        }

        debug!(query = %normalized, batch_id = %batch_id, entries = hits.len(), "External results cached");
        Ok(hits.len())
    }

    /// Delete entries older than `max_age_hours`. Returns how many were removed.
    pub async fn prune_expired(&self, max_age_hours: u64) -> Result<usize, StoreError> {
        let now = Utc::now();
        let max_age = time_window::hours(max_age_hours);
        let mut removed = 0;

        for entry in self.entries().await? {
            if entry.age(now) > max_age
                && self.store.delete(EXTERNAL_CACHE_COLLECTION, &entry.id).await?
            {
                removed += 1;
            }
        }

        info!(removed, max_age_hours, "Pruned external cache");
        Ok(removed)
    }

    /// Entry counts per normalized query.
    pub async fn stats(&self) -> Result<HashMap<String, usize>, StoreError> {
        let mut counts = HashMap::new();
        for entry in self.entries().await? {
            *counts.entry(entry.normalized_query).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, StoreError> {
        db::load_all(self.store.as_ref(), EXTERNAL_CACHE_COLLECTION).await
    }
}

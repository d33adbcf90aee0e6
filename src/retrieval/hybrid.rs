// src/retrieval/hybrid.rs
// Hybrid search: internal vector memory fused with external web knowledge

use super::context::format_fused_context;
use super::scoring::{fused_score, FusionWeights, RankDecay, ResultSource, EXTERNAL_ID_PREFIX};
use super::RetrievalError;
use crate::cache::{normalize_query, ExternalResultCache};
use crate::ingest::DEFAULT_MEMORY_COLLECTION;
use crate::learning::{AdaptiveWeightController, PerformanceMetric, PerformanceTracker};
use crate::memory::vector_store::{VectorFilter, VectorIndex};
use crate::monitoring::metrics::{
    observe_search_latency_ms, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, EXTERNAL_SEARCH_FAILURES_TOTAL,
};
use crate::providers::{EmbeddingProvider, WebSearchProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub default_weights: FusionWeights,
    pub cache_max_age_hours: u64,
    pub rank_decay: RankDecay,
    pub collection: String,
    /// Hits requested from the web search provider on a cache miss.
    pub external_results: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            default_weights: FusionWeights::default(),
            cache_max_age_hours: 24,
            rank_decay: RankDecay::default(),
            collection: DEFAULT_MEMORY_COLLECTION.to_string(),
            external_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridResult {
    pub id: String,
    pub content: String,
    pub source: ResultSource,
    pub confidence: f64,
    pub fused_score: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// One internal memory chunk matched by semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub summary: String,
    pub filename: String,
    pub chunk_index: usize,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchResponse {
    pub results: Vec<HybridResult>,
    pub internal_count: usize,
    pub external_count: usize,
    pub context_text: String,
    pub weights: FusionWeights,
}

impl HybridSearchResponse {
    fn empty(weights: FusionWeights) -> Self {
        Self {
            results: Vec::new(),
            internal_count: 0,
            external_count: 0,
            context_text: format_fused_context(&[]),
            weights,
        }
    }
}

struct ExternalHit {
    id: String,
    title: String,
    url: String,
    content: String,
    confidence: f64,
    captured_at: DateTime<Utc>,
}

pub struct HybridFuser {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorIndex>,
    cache: Arc<ExternalResultCache>,
    web: Arc<dyn WebSearchProvider>,
    controller: Arc<AdaptiveWeightController>,
    tracker: Option<Arc<PerformanceTracker>>,
    config: FusionConfig,
}

impl HybridFuser {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorIndex>,
        cache: Arc<ExternalResultCache>,
        web: Arc<dyn WebSearchProvider>,
        controller: Arc<AdaptiveWeightController>,
        config: FusionConfig,
    ) -> Self {
        Self {
            embedder,
            vectors,
            cache,
            web,
            controller,
            tracker: None,
            config,
        }
    }

    /// Record a performance metric for every search.
    pub fn with_performance_tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fused internal and external results. Never fails: a broken source
    /// contributes zero results and empty input yields an empty response.
    pub async fn search(&self, query: &str, user_id: &str, limit: usize) -> HybridSearchResponse {
        let started = Instant::now();
        let defaults = self.config.default_weights;

        if query.trim().is_empty() || user_id.trim().is_empty() || limit == 0 {
            debug!(user_id = %user_id, limit, "Empty search request");
            return HybridSearchResponse::empty(defaults);
        }

        let weights = self
            .controller
            .get_weights_with_fallback(user_id, defaults.internal, defaults.external)
            .await;

        let (internal, external) = tokio::join!(
            self.search_internal(query, user_id, limit),
            self.search_external(query),
        );

        let internal = internal.unwrap_or_else(|e| {
            warn!(user_id = %user_id, error = %e, "Internal memory search failed");
            Vec::new()
        });

        let mut results: Vec<HybridResult> = internal
            .into_iter()
            .map(|hit| HybridResult {
                id: hit.id,
                content: hit.content,
                source: ResultSource::Internal,
                confidence: hit.confidence,
                fused_score: fused_score(hit.confidence, weights.internal),
                timestamp: Some(hit.created_at),
                url: None,
                title: None,
            })
            .chain(external.into_iter().map(|hit| HybridResult {
                id: hit.id,
                content: hit.content,
                source: ResultSource::External,
                confidence: hit.confidence,
                fused_score: fused_score(hit.confidence, weights.external),
                timestamp: Some(hit.captured_at),
                url: Some(hit.url),
                title: Some(hit.title),
            }))
            .collect();

        results.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        let internal_count = results.iter().filter(|r| r.source == ResultSource::Internal).count();
        let external_count = results.len() - internal_count;
        let context_text = format_fused_context(&results);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        observe_search_latency_ms(elapsed_ms);
        info!(
            user_id = %user_id,
            internal_count,
            external_count,
            internal_weight = weights.internal,
            elapsed_ms,
            "Hybrid search complete"
        );

        self.record_metric(query, user_id, weights, &results, internal_count, external_count, elapsed_ms)
            .await;

        HybridSearchResponse {
            results,
            internal_count,
            external_count,
            context_text,
            weights,
        }
    }

    /// Top-k semantic matches from the user's own memory.
    pub async fn search_internal(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, RetrievalError> {
        if query.trim().is_empty() || user_id.trim().is_empty() {
            return Err(RetrievalError::Validation("query and user id are required".into()));
        }

        let vector = self.embedder.embed(query).await?;
        let scored = self
            .vectors
            .search(&self.config.collection, &vector, &VectorFilter::for_owner(user_id), limit)
            .await?;

        debug!(user_id = %user_id, hits = scored.len(), "Internal memory search");
        Ok(scored
            .into_iter()
            .map(|r| MemoryHit {
                id: r.id,
                content: r.payload.content,
                summary: r.payload.summary,
                filename: r.payload.filename,
                chunk_index: r.payload.chunk_index,
                confidence: (r.score as f64).clamp(0.0, 1.0),
                created_at: r.payload.created_at,
            })
            .collect())
    }

    /// Cached batch if fresh, otherwise the live provider. Provider failure
    /// means no external results.
    async fn search_external(&self, query: &str) -> Vec<ExternalHit> {
        let normalized = normalize_query(query);

        match self.cache.get_cached(query, self.config.cache_max_age_hours).await {
            Ok(entries) if !entries.is_empty() => {
                CACHE_HITS_TOTAL.inc();
                debug!(query = %normalized, entries = entries.len(), "External cache hit");
                return entries
                    .into_iter()
                    .map(|e| ExternalHit {
                        id: format!("{}{}_{}", EXTERNAL_ID_PREFIX, normalized, e.rank),
                        title: e.title,
                        url: e.url,
                        content: e.content,
                        confidence: e.confidence,
                        captured_at: e.cached_at,
                    })
                    .collect();
            }
            Ok(_) => CACHE_MISSES_TOTAL.inc(),
            Err(e) => {
                CACHE_MISSES_TOTAL.inc();
                warn!(query = %normalized, error = %e, "External cache read failed");
            }
        }

        let hits = match self.web.search(query, self.config.external_results).await {
            Ok(hits) => hits,
            Err(e) => {
                EXTERNAL_SEARCH_FAILURES_TOTAL.inc();
                warn!(provider = self.web.name(), error = %e, "External search failed; continuing without it");
                return Vec::new();
            }
        };

        let captured_at = Utc::now();
        if let Err(e) = self.cache.write_at(query, &hits, captured_at).await {
            warn!(query = %normalized, error = %e, "Failed to cache external results");
        }

        hits.into_iter()
            .enumerate()
            .map(|(rank, hit)| ExternalHit {
                id: format!("{}{}_{}", EXTERNAL_ID_PREFIX, normalized, rank),
                title: hit.title,
                url: hit.url,
                content: hit.snippet,
                confidence: self.config.rank_decay.confidence(rank),
                captured_at,
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_metric(
        &self,
        query: &str,
        user_id: &str,
        weights: FusionWeights,
        results: &[HybridResult],
        internal_count: usize,
        external_count: usize,
        elapsed_ms: f64,
    ) {
        let Some(tracker) = &self.tracker else {
            return;
        };

        let n = results.len().max(1) as f64;
        let avg_confidence = results.iter().map(|r| r.confidence).sum::<f64>() / n;
        let avg_fused = results.iter().map(|r| r.fused_score).sum::<f64>() / n;
        let metric = PerformanceMetric::new(
            user_id,
            query,
            weights,
            internal_count,
            external_count,
            avg_confidence,
            avg_fused,
            elapsed_ms.round() as u64,
        );

        if let Err(e) = tracker.record(&metric).await {
            warn!(user_id = %user_id, error = %e, "Failed to record search metric");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentStore, InMemoryDocumentStore};
    use crate::learning::LearningConfig;
    use crate::memory::vector_store::{InMemoryVectorStore, MemoryPayload};
    use crate::providers::{
        DisabledWebSearch, EmbeddingConfig, HashEmbedder, SearchProviderError, WebSearchHit,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSearch {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WebSearchProvider for CountingSearch {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchHit>, SearchProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SearchProviderError::Status(503));
            }
            Ok((0..max_results.min(3))
                .map(|i| WebSearchHit {
                    title: format!("{} result {}", query, i),
                    snippet: format!("snippet {}", i),
                    url: format!("https://example.com/{}", i),
                })
                .collect())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    async fn fuser(web: Arc<dyn WebSearchProvider>) -> (HybridFuser, Arc<PerformanceTracker>) {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(EmbeddingConfig {
            dimension: 64,
            cache_size: 16,
        }));
        let vectors = Arc::new(InMemoryVectorStore::new());
        for (i, text) in ["rust ownership and borrowing", "gardening tips for tomatoes"].iter().enumerate() {
            vectors
                .upsert(
                    DEFAULT_MEMORY_COLLECTION,
                    &format!("job_{}", i),
                    embedder.embed(text).await.unwrap(),
                    MemoryPayload {
                        owner_id: "u1".into(),
                        agent_scope: "universe".into(),
                        filename: "notes.txt".into(),
                        chunk_index: i,
                        content: text.to_string(),
                        summary: String::new(),
                        job_id: None,
                        source_type: "document".into(),
                        created_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let cache = Arc::new(ExternalResultCache::new(store.clone(), RankDecay::default()));
        let controller = Arc::new(AdaptiveWeightController::new(store.clone(), LearningConfig::default()));
        let tracker = Arc::new(PerformanceTracker::new(store));
        let fuser = HybridFuser::new(embedder, vectors, cache, web, controller, FusionConfig::default())
            .with_performance_tracker(tracker.clone());
        (fuser, tracker)
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let (fuser, _) = fuser(Arc::new(DisabledWebSearch)).await;
        let response = fuser.search("   ", "u1", 5).await;
        assert!(response.results.is_empty());
        assert_eq!(response.context_text, "No relevant knowledge found.");
        assert!(fuser.search("rust", "", 5).await.results.is_empty());
    }

    #[tokio::test]
    async fn test_results_sorted_and_scored() {
        let web = Arc::new(CountingSearch { calls: AtomicUsize::new(0), fail: false });
        let (fuser, tracker) = fuser(web).await;
        let response = fuser.search("rust ownership", "u1", 10).await;

        assert!(response.internal_count > 0);
        assert_eq!(response.external_count, 3);
        for pair in response.results.windows(2) {
            assert!(pair[0].fused_score >= pair[1].fused_score);
        }
        for r in &response.results {
            let weight = match r.source {
                ResultSource::Internal => response.weights.internal,
                ResultSource::External => response.weights.external,
            };
            assert!((r.fused_score - r.confidence * weight).abs() < 1e-9);
        }
        assert!(response.results.iter().any(|r| r.id.starts_with(EXTERNAL_ID_PREFIX)));

        let metrics = tracker.list_since(Utc::now() - chrono::Duration::hours(1), Some("u1")).await.unwrap();
        assert_eq!(metrics.len(), 1);
    }

    #[tokio::test]
    async fn test_second_search_uses_cache() {
        let web = Arc::new(CountingSearch { calls: AtomicUsize::new(0), fail: false });
        let (fuser, _) = fuser(web.clone()).await;
        fuser.search("Rust Ownership", "u1", 10).await;
        let second = fuser.search("  rust   ownership ", "u1", 10).await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.external_count, 3);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_internal_results() {
        let web = Arc::new(CountingSearch { calls: AtomicUsize::new(0), fail: true });
        let (fuser, _) = fuser(web).await;
        let response = fuser.search("rust ownership", "u1", 10).await;
        assert_eq!(response.external_count, 0);
        assert!(response.internal_count > 0);
        assert!(response.results.iter().all(|r| r.source == ResultSource::Internal));
    }

    #[tokio::test]
    async fn test_internal_search_is_owner_scoped() {
        let (fuser, _) = fuser(Arc::new(DisabledWebSearch)).await;
        assert!(fuser.search_internal("rust", "someone-else", 5).await.unwrap().is_empty());
        let mine = fuser.search_internal("rust ownership", "u1", 1).await.unwrap();
        assert_eq!(mine[0].id, "job_0");
    }
}

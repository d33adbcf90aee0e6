// src/engine.rs
// Wires the components together from explicitly constructed dependencies

use crate::agents::{AgentConfig, AgentOrchestrator, SessionManager};
use crate::cache::ExternalResultCache;
use crate::config::EngineConfig;
use crate::db::{DocumentStore, SqliteDocumentStore, StoreError};
use crate::ingest::{IngestionPipeline, JobRegistry, PipelineConfig};
use crate::learning::{AdaptiveWeightController, FeedbackAggregator, LearningConfig, PerformanceTracker};
use crate::memory::vector_store::{InMemoryVectorStore, VectorIndex, VectorStoreError};
use crate::providers::{
    BraveSearchProvider, DisabledWebSearch, EmbeddingConfig, EmbeddingProvider, HashEmbedder, IdentityResolver,
    LlmConfig, LlmProvider, OllamaEmbedder, OllamaProvider, WebSearchProvider,
};
use crate::retrieval::{FusionConfig, HybridFuser};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document store: {0}")]
    Store(#[from] StoreError),
    #[error("vector store: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// External collaborators the engine runs against.
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<dyn DocumentStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub web: Arc<dyn WebSearchProvider>,
    pub identity: Arc<dyn IdentityResolver>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub pipeline: PipelineConfig,
    pub fusion: FusionConfig,
    pub learning: LearningConfig,
    pub agents: AgentConfig,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            fusion: config.fusion.clone(),
            learning: config.learning.clone(),
            agents: config.agents.clone(),
        }
    }
}

pub struct MemoryEngine {
    pub pipeline: IngestionPipeline,
    pub cache: Arc<ExternalResultCache>,
    pub controller: Arc<AdaptiveWeightController>,
    pub tracker: Arc<PerformanceTracker>,
    pub feedback: Arc<FeedbackAggregator>,
    pub fuser: Arc<HybridFuser>,
    pub sessions: Arc<SessionManager>,
    pub orchestrator: AgentOrchestrator,
    vectors: Arc<dyn VectorIndex>,
}

impl MemoryEngine {
    pub fn new(deps: EngineDeps, settings: EngineSettings) -> Self {
        let registry = Arc::new(JobRegistry::new(deps.store.clone()));
        let pipeline = IngestionPipeline::new(
            settings.pipeline,
            registry,
            deps.embedder.clone(),
            deps.llm.clone(),
            deps.vectors.clone(),
        );

        let cache = Arc::new(ExternalResultCache::new(deps.store.clone(), settings.fusion.rank_decay));
        let controller = Arc::new(AdaptiveWeightController::new(deps.store.clone(), settings.learning));
        let tracker = Arc::new(PerformanceTracker::new(deps.store.clone()));
        let feedback = Arc::new(FeedbackAggregator::new(
            deps.store.clone(),
            controller.clone(),
            tracker.clone(),
        ));

        let fuser = Arc::new(
            HybridFuser::new(
                deps.embedder.clone(),
                deps.vectors.clone(),
                cache.clone(),
                deps.web.clone(),
                controller.clone(),
                settings.fusion,
            )
            .with_performance_tracker(tracker.clone()),
        );

        let sessions = Arc::new(SessionManager::new(deps.store.clone()));
        let orchestrator = AgentOrchestrator::new(
            fuser.clone(),
            deps.llm,
            deps.identity,
            sessions.clone(),
            deps.embedder,
            deps.vectors.clone(),
            settings.agents,
        );

        Self {
            pipeline,
            cache,
            controller,
            tracker,
            feedback,
            fuser,
            sessions,
            orchestrator,
            vectors: deps.vectors,
        }
    }

    /// Production wiring: SQLite documents, snapshot-backed vectors, Ollama
    /// for completions (and embeddings when a model is configured), Brave
    /// for web search when a key is present.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open(&config.db_path)?);

        let vectors: Arc<dyn VectorIndex> = match &config.vector_snapshot {
            Some(path) => Arc::new(InMemoryVectorStore::with_snapshot(path.clone()).await?),
            None => Arc::new(InMemoryVectorStore::new()),
        };

        let p = &config.providers;
        let embedder: Arc<dyn EmbeddingProvider> = match &p.ollama_embed_model {
            Some(model) => Arc::new(OllamaEmbedder::new(p.ollama_url.clone(), model.clone(), p.embedding_dimension)),
            None => Arc::new(HashEmbedder::new(EmbeddingConfig {
                dimension: p.embedding_dimension,
                ..EmbeddingConfig::default()
            })),
        };
        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(LlmConfig {
            ollama_url: p.ollama_url.clone(),
            model: p.ollama_model.clone(),
        }));
        let web: Arc<dyn WebSearchProvider> = match &p.brave_api_key {
            Some(key) => Arc::new(BraveSearchProvider::new(key.clone())),
            None => Arc::new(DisabledWebSearch),
        };
        let identity: Arc<dyn IdentityResolver> = Arc::new(config.identity_resolver());

        let embedder_kind = if p.ollama_embed_model.is_some() { "ollama" } else { "hash" };
        info!(
            db_path = ?config.db_path,
            snapshot = ?config.vector_snapshot,
            embedder = embedder_kind,
            web_search = web.name(),
            "Engine initialized"
        );

        Ok(Self::new(
            EngineDeps { store, vectors, embedder, llm, web, identity },
            EngineSettings::from(config),
        ))
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }
}

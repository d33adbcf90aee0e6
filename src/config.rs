// src/config.rs
use crate::agents::AgentConfig;
use crate::ingest::PipelineConfig;
use crate::learning::LearningConfig;
use crate::memory::ChunkerConfig;
use crate::monitoring::MonitoringConfig;
use crate::providers::StaticIdentityResolver;
use crate::retrieval::{FusionConfig, FusionWeights, RankDecay};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub ollama_url: String,
    pub ollama_model: String,
    /// When unset, the local hashed embedder is used.
    pub ollama_embed_model: Option<String>,
    pub embedding_dimension: usize,
    /// When unset, external search is disabled.
    pub brave_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub vector_snapshot: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub fusion: FusionConfig,
    pub learning: LearningConfig,
    pub agents: AgentConfig,
    pub providers: ProviderConfig,
    pub monitoring: MonitoringConfig,
    /// `email=user_id` pairs for the static identity resolver.
    pub users: String,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let chunker = ChunkerConfig {
            chunk_size: parse_or("MEMFUSE_CHUNK_SIZE", 4000)?,
            chunk_overlap: parse_or("MEMFUSE_CHUNK_OVERLAP", 200)?,
        };
        let pipeline = PipelineConfig {
            chunker,
            summary_max_words: parse_or("MEMFUSE_SUMMARY_MAX_WORDS", 150)?,
            summary_fallback_chars: parse_or("MEMFUSE_SUMMARY_FALLBACK_CHARS", 150)?,
            ..PipelineConfig::default()
        };

        let default_weights = FusionWeights::new(
            parse_or("MEMFUSE_DEFAULT_INTERNAL_WEIGHT", 0.6)?,
            parse_or("MEMFUSE_DEFAULT_EXTERNAL_WEIGHT", 0.4)?,
        );
        let fusion = FusionConfig {
            default_weights,
            cache_max_age_hours: parse_or("MEMFUSE_CACHE_MAX_AGE_HOURS", 24)?,
            rank_decay: RankDecay::Linear {
                step: parse_or("MEMFUSE_RANK_DECAY_STEP", 0.1)?,
                floor: parse_or("MEMFUSE_RANK_DECAY_FLOOR", 0.3)?,
            },
            ..FusionConfig::default()
        };

        let learning = LearningConfig {
            default_weights,
            confidence_threshold: parse_or("MEMFUSE_CONFIDENCE_THRESHOLD", 0.6)?,
            learning_rate: parse_or("MEMFUSE_LEARNING_RATE", 0.05)?,
            learning_window_hours: parse_or("MEMFUSE_LEARNING_WINDOW_HOURS", 24)?,
            ..LearningConfig::default()
        };

        let providers = ProviderConfig {
            ollama_url: var("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string()),
            ollama_model: var("OLLAMA_MODEL").unwrap_or_else(|| "llama3.1".to_string()),
            ollama_embed_model: var("OLLAMA_EMBED_MODEL"),
            embedding_dimension: parse_or("MEMFUSE_EMBEDDING_DIM", 384)?,
            brave_api_key: var("BRAVE_API_KEY"),
        };

        let config = Self {
            db_path: var("MEMFUSE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./memfuse.db")),
            vector_snapshot: var("MEMFUSE_VECTOR_SNAPSHOT").map(PathBuf::from),
            pipeline,
            fusion,
            learning,
            agents: AgentConfig::default(),
            providers,
            monitoring: MonitoringConfig::from_env(),
            users: var("MEMFUSE_USERS").unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunker = &self.pipeline.chunker;
        if chunker.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()));
        }
        if chunker.chunk_overlap >= chunker.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                chunker.chunk_overlap, chunker.chunk_size
            )));
        }

        let w = self.fusion.default_weights;
        for (name, value) in [("internal", w.internal), ("external", w.external)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("default {} weight {} is outside [0, 1]", name, value)));
            }
        }
        if (w.internal + w.external - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid("default weights must sum to 1".into()));
        }
        if !(0.0..=1.0).contains(&self.learning.confidence_threshold) {
            return Err(ConfigError::Invalid("confidence threshold must be within [0, 1]".into()));
        }
        if self.providers.embedding_dimension == 0 {
            return Err(ConfigError::Invalid("embedding dimension must be positive".into()));
        }
        Ok(())
    }

    pub fn identity_resolver(&self) -> StaticIdentityResolver {
        StaticIdentityResolver::from_pairs(&self.users)
    }
}

// src/providers/mod.rs
// External collaborators: embeddings, LLM completions, web search, identity

pub mod embedder;
pub mod identity;
pub mod llm;
pub mod web_search;

pub use embedder::{EmbeddingConfig, EmbeddingError, EmbeddingProvider, HashEmbedder, OllamaEmbedder};
pub use identity::{IdentityError, IdentityResolver, StaticIdentityResolver};
pub use llm::{
    extract_json_object, ChatMessage, ChatRole, CompletionOptions, LlmConfig, LlmError,
    LlmProvider, OllamaProvider,
};
pub use web_search::{
    BraveSearchProvider, DisabledWebSearch, SearchProviderError, WebSearchHit, WebSearchProvider,
};

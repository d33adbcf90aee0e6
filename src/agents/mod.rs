// src/agents/mod.rs
// Multi-agent orchestration: graph, schemas, sessions and lanes

pub mod graph;
pub mod orchestrator;
pub mod payload;
pub mod schema;
pub mod session;

pub use graph::{AgentDefinition, AgentGraph, AgentType, HandoffViolation, REASONING_GRAPH};
pub use orchestrator::{
    AgentConfig, AgentOrchestrator, PlannerLaneRequest, PlannerLaneResult, ReasoningLaneResult, UserRef,
    INSIGHT_PREFIX, INSIGHT_SOURCE,
};
pub use payload::HandoffPayload;
pub use schema::{FieldSchema, FieldType, ObjectSchema, SchemaViolation};
pub use session::{AgentExecution, AgentHandoff, AgentSession, SessionManager, SessionStatus, AGENT_SESSIONS_COLLECTION};

use crate::db::StoreError;
use crate::memory::vector_store::VectorStoreError;
use crate::providers::{EmbeddingError, IdentityError, LlmError};
use crate::retrieval::RetrievalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid agent request: {0}")]
    Validation(String),
    #[error("User with email {0} not found")]
    UserNotFound(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("memory retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("insight embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("insight indexing failed: {0}")]
    VectorStore(#[from] VectorStoreError),
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    #[error("handoff {from} -> {to} rejected: {reason}")]
    HandoffRejected {
        from: AgentType,
        to: AgentType,
        reason: String,
    },
    #[error("session {session_id}: {reason}")]
    InvalidTransition { session_id: String, reason: String },
    #[error("agent session {0} not found")]
    SessionNotFound(String),
    #[error("session {session_id} ran {executed} of {declared} declared steps")]
    IncompleteSession {
        session_id: String,
        executed: usize,
        declared: usize,
    },
}

// tests/agent_sessions.rs
// Planner and reasoning lanes against scripted model replies

mod common;

use common::{engine, hash_embedder, memory_payload, test_deps, ScriptedLlm};
use memfuse::agents::{
    AgentError, AgentType, PlannerLaneRequest, SessionStatus, UserRef, AGENT_SESSIONS_COLLECTION, INSIGHT_PREFIX,
    INSIGHT_SOURCE,
};
use memfuse::ingest::DEFAULT_MEMORY_COLLECTION;
use memfuse::db::DocumentStore;
use memfuse::memory::{VectorFilter, VectorIndex};
use memfuse::providers::EmbeddingProvider;
use memfuse::MemoryEngine;
use std::sync::Arc;

const PLAN_REPLY: &str = r#"{"plan": ["Collect requirements", "Draft the design"], "reasoning": "Requirements come first"}"#;
const REASON_REPLY: &str = r#"Here you go: {"result": "Use a TTL cache", "reasoning": "Web calls are slow", "insights": ["Caching pays off"]}"#;
const REFLECT_REPLY: &str = r#"{"reflection": "The plan held up", "keyInsights": ["Cache web results", "  "]}"#;

async fn seed_memory(engine: &MemoryEngine, id: &str, owner: &str, content: &str) {
    let vector = hash_embedder().embed(content).await.unwrap();
    engine
        .vectors()
        .upsert(DEFAULT_MEMORY_COLLECTION, id, vector, memory_payload(owner, content))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_planner_lane_completes_session() {
    let llm = Arc::new(ScriptedLlm::new(PLAN_REPLY));
    let engine = engine(test_deps(llm.clone()));
    seed_memory(&engine, "mem_1", "alice", "The design review happens on Fridays").await;

    let result = engine
        .orchestrator
        .run_planner_lane(PlannerLaneRequest {
            goal: "Prepare the design review".to_string(),
            user: UserRef::Email("Alice@Example.com".to_string()),
            context: Some("Deadline is Friday".to_string()),
        })
        .await
        .expect("planner lane should succeed");

    assert_eq!(result.plan, vec!["Collect requirements", "Draft the design"]);
    assert_eq!(result.estimated_steps, 2);
    assert_eq!(result.reasoning, "Requirements come first");
    assert_eq!(llm.calls(), 1);

    let session = engine
        .sessions
        .get_session(&result.session_id)
        .await
        .unwrap()
        .expect("session stored");
    assert_eq!(session.user_id, "alice");
    assert_eq!(session.status, SessionStatus::Complete);
    assert!(session.completed_at.is_some());
    assert_eq!(session.context_memories, vec!["mem_1".to_string()]);

    let agents: Vec<AgentType> = session.executions.iter().map(|e| e.agent).collect();
    assert_eq!(agents, vec![AgentType::Memory, AgentType::Planner]);

    assert_eq!(session.handoffs.len(), 1);
    let handoff = &session.handoffs[0];
    assert_eq!((handoff.from, handoff.to), (AgentType::Memory, AgentType::Planner));
    let context = handoff.data["context"].as_str().unwrap();
    assert!(context.starts_with("Deadline is Friday\n\n--- Relevant Memories ---\n"));
    assert!(context.contains("design review happens on Fridays"));
}

#[tokio::test]
async fn test_planner_lane_accepts_numbered_text() {
    let llm = Arc::new(ScriptedLlm::new("Plan:\n1. Book a room\n2) Send invites\n- Prepare slides"));
    let engine = engine(test_deps(llm));

    let result = engine
        .orchestrator
        .run_planner_lane(PlannerLaneRequest {
            goal: "Organize the meeting".to_string(),
            user: UserRef::Id("alice".to_string()),
            context: None,
        })
        .await
        .unwrap();

    assert_eq!(result.plan, vec!["Book a room", "Send invites", "Prepare slides"]);
    assert_eq!(result.reasoning, "");
}

#[tokio::test]
async fn test_reasoning_lane_saves_reflection_insights() {
    let llm = Arc::new(
        ScriptedLlm::new("unexpected extra call")
            .then(PLAN_REPLY)
            .then(REASON_REPLY)
            .then(REFLECT_REPLY),
    );
    let engine = engine(test_deps(llm.clone()));
    seed_memory(&engine, "mem_1", "alice", "Web search is slow and rate limited").await;

    let result = engine
        .orchestrator
        .run_reasoning_lane("How should we speed up search?", &UserRef::Id("alice".to_string()))
        .await
        .expect("reasoning lane should succeed");

    assert_eq!(result.result, "Use a TTL cache");
    assert_eq!(result.reflection, "The plan held up");
    assert_eq!(result.key_insights, vec!["Cache web results"]);
    assert_eq!(llm.calls(), 3);

    let session = engine.sessions.get_session(&result.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.executions.len(), 4);
    assert_eq!(session.handoffs.len(), 3);
    assert_eq!(session.handoffs[1].data["plan"][0], "Collect requirements");
    assert_eq!(session.handoffs[2].data["insights"][0], "Caching pays off");

    let insights: Vec<_> = engine
        .vectors()
        .list(DEFAULT_MEMORY_COLLECTION, &VectorFilter::for_owner("alice").with_filename(INSIGHT_SOURCE))
        .await
        .unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].id, format!("insight_{}_0", result.session_id));
    assert_eq!(insights[0].payload.content, format!("{}Cache web results", INSIGHT_PREFIX));
    assert_eq!(insights[0].payload.source_type, "insight");
    assert_eq!(insights[0].payload.agent_scope, "universe");
}

#[tokio::test]
async fn test_empty_plan_is_rejected_at_reasoner_handoff() {
    let llm = Arc::new(ScriptedLlm::new(r#"{"plan": [], "reasoning": "Nothing to do"}"#));
    let engine = engine(test_deps(llm.clone()));

    let err = engine
        .orchestrator
        .run_reasoning_lane("Do something", &UserRef::Id("alice".to_string()))
        .await
        .unwrap_err();

    match err {
        AgentError::HandoffRejected { from, to, .. } => {
            assert_eq!(from, AgentType::Planner);
            assert_eq!(to, AgentType::Reasoner);
        }
        other => panic!("expected a rejected handoff, got {:?}", other),
    }
    // The reasoner never ran
    assert_eq!(llm.calls(), 1);

    let sessions = engine.sessions.list_user_sessions("alice", 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.status, SessionStatus::Error);
    assert!(session.error.as_deref().unwrap_or_default().contains("rejected"));
    assert_eq!(session.executions.len(), 2);
    assert_eq!(session.handoffs.len(), 1);

    let insights = engine
        .vectors()
        .list(DEFAULT_MEMORY_COLLECTION, &VectorFilter::for_owner("alice"))
        .await
        .unwrap();
    assert!(insights.is_empty());
}

#[tokio::test]
async fn test_unknown_email_creates_no_session() {
    let deps = test_deps(Arc::new(ScriptedLlm::new(PLAN_REPLY)));
    let store = deps.store.clone();
    let engine = engine(deps);

    let err = engine
        .orchestrator
        .run_planner_lane(PlannerLaneRequest {
            goal: "Anything".to_string(),
            user: UserRef::Email("nobody@example.com".to_string()),
            context: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(&err, AgentError::UserNotFound(email) if email == "nobody@example.com"));
    assert_eq!(err.to_string(), "User with email nobody@example.com not found");
    assert!(store.list(AGENT_SESSIONS_COLLECTION).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_model_failure_marks_session_error() {
    let engine = engine(test_deps(Arc::new(ScriptedLlm::failing())));

    let err = engine
        .orchestrator
        .run_planner_lane(PlannerLaneRequest {
            goal: "Plan the release".to_string(),
            user: UserRef::Id("alice".to_string()),
            context: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Llm(_)));

    let sessions = engine.sessions.list_user_sessions("alice", 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Error);
    assert_eq!(sessions[0].executions.len(), 1);
    assert!(sessions[0].error.is_some());
}

#[tokio::test]
async fn test_blank_user_is_rejected() {
    let engine = engine(test_deps(Arc::new(ScriptedLlm::new(PLAN_REPLY))));

    let err = engine
        .orchestrator
        .run_reasoning_lane("Question", &UserRef::Id("  ".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)));
}

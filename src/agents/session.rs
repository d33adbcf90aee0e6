// src/agents/session.rs
// Durable agent session state machine: active -> complete | error

use super::graph::{AgentGraph, AgentType, REASONING_GRAPH};
use super::payload::HandoffPayload;
use super::AgentError;
use crate::db::{self, DocumentStore};
use crate::monitoring::metrics::{AGENT_SESSIONS_BY_OUTCOME, HANDOFFS_REJECTED_TOTAL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const AGENT_SESSIONS_COLLECTION: &str = "agent_sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Complete,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Complete => "complete",
            SessionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecution {
    pub agent: AgentType,
    pub result: Value,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHandoff {
    pub from: AgentType,
    pub to: AgentType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub session_id: String,
    pub user_id: String,
    pub goal: String,
    pub lane: String,
    pub status: SessionStatus,
    pub declared_steps: Vec<AgentType>,
    #[serde(default)]
    pub context_memories: Vec<String>,
    #[serde(default)]
    pub executions: Vec<AgentExecution>,
    #[serde(default)]
    pub handoffs: Vec<AgentHandoff>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentSession {
    pub fn is_terminal(&self) -> bool {
        self.status != SessionStatus::Active
    }

    /// Declared step that should execute next.
    pub fn next_step(&self) -> Option<AgentType> {
        self.declared_steps.get(self.executions.len()).copied()
    }

    pub fn last_executed(&self) -> Option<AgentType> {
        self.executions.last().map(|e| e.agent)
    }
}

pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    graph: &'static AgentGraph,
}

impl SessionManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, graph: &REASONING_GRAPH }
    }

    pub fn graph(&self) -> &AgentGraph {
        self.graph
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        goal: &str,
        lane: &str,
        steps: &[AgentType],
    ) -> Result<AgentSession, AgentError> {
        if user_id.trim().is_empty() {
            return Err(AgentError::Validation("user id must not be empty".into()));
        }
        if goal.trim().is_empty() {
            return Err(AgentError::Validation("goal must not be empty".into()));
        }
        if !self.graph.is_path(steps) {
            return Err(AgentError::Validation(format!(
                "steps {:?} do not follow the reasoning graph",
                steps
            )));
        }

        let now = Utc::now();
        let session = AgentSession {
            session_id: format!("agent_{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            goal: goal.to_string(),
            lane: lane.to_string(),
            status: SessionStatus::Active,
            declared_steps: steps.to_vec(),
            context_memories: Vec::new(),
            executions: Vec::new(),
            handoffs: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.save(&session).await?;
        info!(session_id = %session.session_id, user_id = %user_id, lane = %lane, "Agent session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<AgentSession>, AgentError> {
        Ok(db::load(self.store.as_ref(), AGENT_SESSIONS_COLLECTION, session_id).await?)
    }

    /// Most recent sessions for a user, newest first.
    pub async fn list_user_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<AgentSession>, AgentError> {
        let mut sessions: Vec<AgentSession> = db::load_all(self.store.as_ref(), AGENT_SESSIONS_COLLECTION)
            .await?
            .into_iter()
            .filter(|s: &AgentSession| s.user_id == user_id)
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Record one step's output. Steps run in declared order, and every step
    /// after the first needs an accepted handoff into it.
    pub async fn record_agent_execution(
        &self,
        session_id: &str,
        agent: AgentType,
        result: Value,
    ) -> Result<AgentSession, AgentError> {
        let mut session = self.load_active(session_id).await?;

        if session.next_step() != Some(agent) {
            return Err(AgentError::InvalidTransition {
                session_id: session_id.to_string(),
                reason: format!("{} is not the next declared step", agent),
            });
        }
        if let Some(previous) = session.last_executed() {
            let handed_off = session
                .handoffs
                .last()
                .map_or(false, |h| h.from == previous && h.to == agent);
            if !handed_off {
                return Err(AgentError::InvalidTransition {
                    session_id: session_id.to_string(),
                    reason: format!("no accepted handoff from {} to {}", previous, agent),
                });
            }
        }

        session.executions.push(AgentExecution {
            agent,
            result,
            completed_at: Utc::now(),
        });
        session.updated_at = Utc::now();
        self.save(&session).await?;
        debug!(session_id = %session_id, agent = %agent, "Agent step recorded");
        Ok(session)
    }

    /// Validate and record a handoff. A rejected handoff ends the session
    /// in `error`.
    pub async fn record_agent_handoff(
        &self,
        session_id: &str,
        from: AgentType,
        to: AgentType,
        data: Value,
    ) -> Result<HandoffPayload, AgentError> {
        let mut session = self.load_active(session_id).await?;

        let checked = self.check_handoff(&session, from, to, &data);
        let payload = match checked {
            Ok(payload) => payload,
            Err(reason) => {
                HANDOFFS_REJECTED_TOTAL.inc();
                warn!(session_id = %session_id, from = %from, to = %to, reason = %reason, "Handoff rejected");
                let err = AgentError::HandoffRejected { from, to, reason };
                self.mark_failed(&mut session, &err.to_string()).await?;
                return Err(err);
            }
        };

        session.handoffs.push(AgentHandoff {
            from,
            to,
            data,
            timestamp: Utc::now(),
        });
        session.updated_at = Utc::now();
        self.save(&session).await?;
        debug!(session_id = %session_id, from = %from, to = %to, "Handoff accepted");
        Ok(payload)
    }

    fn check_handoff(
        &self,
        session: &AgentSession,
        from: AgentType,
        to: AgentType,
        data: &Value,
    ) -> Result<HandoffPayload, String> {
        if session.last_executed() != Some(from) {
            return Err(format!("{} has not just executed", from));
        }
        if session.next_step() != Some(to) {
            return Err(format!("{} is not the next declared step", to));
        }
        self.graph
            .validate_handoff(from, to, data)
            .map_err(|e| e.to_string())?;

        match HandoffPayload::parse(from, to, data.clone()) {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(e)) => Err(format!("payload does not parse: {}", e)),
            None => Err(format!("no payload type for {} -> {}", from, to)),
        }
    }

    /// Mark the session complete. Every declared step must have executed.
    pub async fn complete_session(
        &self,
        session_id: &str,
        context_memories: Vec<String>,
    ) -> Result<AgentSession, AgentError> {
        let mut session = self.load_active(session_id).await?;

        if session.executions.len() != session.declared_steps.len() {
            return Err(AgentError::IncompleteSession {
                session_id: session_id.to_string(),
                executed: session.executions.len(),
                declared: session.declared_steps.len(),
            });
        }

        let now = Utc::now();
        session.context_memories = context_memories;
        session.status = SessionStatus::Complete;
        session.updated_at = now;
        session.completed_at = Some(now);
        self.save(&session).await?;

        AGENT_SESSIONS_BY_OUTCOME
            .with_label_values(&[session.lane.as_str(), "complete"])
            .inc();
        info!(session_id = %session_id, steps = session.executions.len(), "Agent session complete");
        Ok(session)
    }

    /// Move an active session to `error`. Terminal sessions are left alone.
    pub async fn fail_session(&self, session_id: &str, message: &str) -> Result<(), AgentError> {
        let Some(mut session) = self.get_session(session_id).await? else {
            return Err(AgentError::SessionNotFound(session_id.to_string()));
        };
        if session.is_terminal() {
            return Ok(());
        }
        self.mark_failed(&mut session, message).await
    }

    async fn mark_failed(&self, session: &mut AgentSession, message: &str) -> Result<(), AgentError> {
        let now = Utc::now();
        session.status = SessionStatus::Error;
        session.error = Some(message.to_string());
        session.updated_at = now;
        session.completed_at = Some(now);
        self.save(session).await?;

        AGENT_SESSIONS_BY_OUTCOME
            .with_label_values(&[session.lane.as_str(), "error"])
            .inc();
        error!(session_id = %session.session_id, error = %message, "Agent session failed");
        Ok(())
    }

    async fn load_active(&self, session_id: &str) -> Result<AgentSession, AgentError> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;
        if session.is_terminal() {
            return Err(AgentError::InvalidTransition {
                session_id: session_id.to_string(),
                reason: format!("session is already {}", session.status),
            });
        }
        Ok(session)
    }

    async fn save(&self, session: &AgentSession) -> Result<(), AgentError> {
        db::save(self.store.as_ref(), AGENT_SESSIONS_COLLECTION, &session.session_id, session).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDocumentStore;
    use serde_json::json;

    const PLANNER_LANE: [AgentType; 2] = [AgentType::Memory, AgentType::Planner];

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(InMemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn test_happy_path() {
        let m = manager();
        let s = m.create_session("u1", "learn rust", "planner", &PLANNER_LANE).await.unwrap();
        assert!(s.session_id.starts_with("agent_"));

        m.record_agent_execution(&s.session_id, AgentType::Memory, json!({"memories": [], "context": ""}))
            .await
            .unwrap();
        let payload = m
            .record_agent_handoff(
                &s.session_id,
                AgentType::Memory,
                AgentType::Planner,
                json!({"goal": "learn rust", "context": ""}),
            )
            .await
            .unwrap();
        assert!(matches!(payload, HandoffPayload::MemoryToPlanner(_)));
        m.record_agent_execution(&s.session_id, AgentType::Planner, json!({"plan": ["a"], "reasoning": "r"}))
            .await
            .unwrap();

        let done = m.complete_session(&s.session_id, vec!["m1".into()]).await.unwrap();
        assert_eq!(done.status, SessionStatus::Complete);
        assert!(done.completed_at.is_some());
        assert_eq!(done.context_memories, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_out_of_order_execution_is_refused() {
        let m = manager();
        let s = m.create_session("u1", "g", "planner", &PLANNER_LANE).await.unwrap();
        let err = m
            .record_agent_execution(&s.session_id, AgentType::Planner, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));

        m.record_agent_execution(&s.session_id, AgentType::Memory, json!({})).await.unwrap();
        // planner may not run before the handoff
        assert!(m
            .record_agent_execution(&s.session_id, AgentType::Planner, json!({}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_rejected_handoff_fails_session() {
        let m = manager();
        let s = m.create_session("u1", "g", "planner", &PLANNER_LANE).await.unwrap();
        m.record_agent_execution(&s.session_id, AgentType::Memory, json!({})).await.unwrap();

        let err = m
            .record_agent_handoff(&s.session_id, AgentType::Memory, AgentType::Planner, json!({"goal": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::HandoffRejected { .. }));

        let stored = m.get_session(&s.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Error);
        assert!(stored.error.is_some());
        assert!(stored.handoffs.is_empty());

        // nothing further runs and the session can never complete
        assert!(m.record_agent_execution(&s.session_id, AgentType::Planner, json!({})).await.is_err());
        assert!(m.complete_session(&s.session_id, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_incomplete_session_cannot_complete() {
        let m = manager();
        let s = m.create_session("u1", "g", "planner", &PLANNER_LANE).await.unwrap();
        assert!(matches!(
            m.complete_session(&s.session_id, vec![]).await,
            Err(AgentError::IncompleteSession { executed: 0, declared: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_session_leaves_terminal_sessions() {
        let m = manager();
        let s = m.create_session("u1", "g", "planner", &[AgentType::Memory]).await.unwrap();
        m.record_agent_execution(&s.session_id, AgentType::Memory, json!({})).await.unwrap();
        m.complete_session(&s.session_id, vec![]).await.unwrap();

        m.fail_session(&s.session_id, "late failure").await.unwrap();
        let stored = m.get_session(&s.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Complete);
    }

    #[tokio::test]
    async fn test_create_validates() {
        let m = manager();
        assert!(m.create_session("", "g", "planner", &PLANNER_LANE).await.is_err());
        assert!(m
            .create_session("u1", "g", "planner", &[AgentType::Memory, AgentType::Reflector])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_user_sessions() {
        let m = manager();
        m.create_session("u1", "a", "planner", &PLANNER_LANE).await.unwrap();
        m.create_session("u1", "b", "planner", &PLANNER_LANE).await.unwrap();
        m.create_session("u2", "c", "planner", &PLANNER_LANE).await.unwrap();
        let mine = m.list_user_sessions("u1", 10).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].created_at >= mine[1].created_at);
    }
}

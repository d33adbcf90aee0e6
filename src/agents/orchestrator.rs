// src/agents/orchestrator.rs
// Planner and reasoning lanes over the agent graph

use super::graph::AgentType;
use super::payload::{
    HandoffPayload, MemoryOutput, PlannerInput, PlannerOutput, ReasonerInput, ReasonerOutput,
    ReflectorInput, ReflectorOutput,
};
use super::session::SessionManager;
use super::AgentError;
use crate::db;
use crate::ingest::DEFAULT_MEMORY_COLLECTION;
use crate::memory::vector_store::{MemoryPayload, VectorIndex};
use crate::providers::{
    extract_json_object, ChatMessage, CompletionOptions, EmbeddingProvider, IdentityResolver, LlmProvider,
};
use crate::retrieval::{HybridFuser, MemoryHit};
use chrono::Utc;
use futures_util::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const PLANNER_LANE_STEPS: [AgentType; 2] = [AgentType::Memory, AgentType::Planner];
const REASONING_LANE_STEPS: [AgentType; 4] = [
    AgentType::Memory,
    AgentType::Planner,
    AgentType::Reasoner,
    AgentType::Reflector,
];

pub const INSIGHT_PREFIX: &str = "⭐ INSIGHT: ";
pub const INSIGHT_SOURCE: &str = "agent-reflection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub memory_limit: usize,
    pub planner_temperature: f32,
    pub reasoning_temperature: f32,
    /// Vector collection and scope that reflector insights are written to.
    pub insight_collection: String,
    pub insight_scope: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            memory_limit: 10,
            planner_temperature: 0.7,
            reasoning_temperature: 0.0,
            insight_collection: DEFAULT_MEMORY_COLLECTION.to_string(),
            insight_scope: "universe".to_string(),
        }
    }
}

/// Who a lane runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(String),
    Email(String),
}

#[derive(Debug, Clone)]
pub struct PlannerLaneRequest {
    pub goal: String,
    pub user: UserRef,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerLaneResult {
    pub session_id: String,
    pub plan: Vec<String>,
    pub reasoning: String,
    pub estimated_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningLaneResult {
    pub session_id: String,
    pub result: String,
    pub reflection: String,
    pub key_insights: Vec<String>,
}

pub struct AgentOrchestrator {
    fuser: Arc<HybridFuser>,
    llm: Arc<dyn LlmProvider>,
    identity: Arc<dyn IdentityResolver>,
    sessions: Arc<SessionManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorIndex>,
    config: AgentConfig,
}

impl AgentOrchestrator {
    pub fn new(
        fuser: Arc<HybridFuser>,
        llm: Arc<dyn LlmProvider>,
        identity: Arc<dyn IdentityResolver>,
        sessions: Arc<SessionManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorIndex>,
        config: AgentConfig,
    ) -> Self {
        Self {
            fuser,
            llm,
            identity,
            sessions,
            embedder,
            vectors,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Memory -> Planner. A returned plan always comes from a complete
    /// session; any failure marks the session `error` and is returned.
    pub async fn run_planner_lane(&self, request: PlannerLaneRequest) -> Result<PlannerLaneResult, AgentError> {
        let user_id = self.resolve_user(&request.user).await?;
        let session = self
            .sessions
            .create_session(&user_id, &request.goal, "planner", &PLANNER_LANE_STEPS)
            .await?;
        info!(session_id = %session.session_id, user_id = %user_id, "Planner lane started");

        let outcome = self
            .planner_steps(&session.session_id, &user_id, &request.goal, request.context.as_deref())
            .await;
        self.finish(&session.session_id, outcome).await
    }

    /// Memory -> Planner -> Reasoner -> Reflector. Reflector insights are
    /// written back to vector memory before the session completes.
    pub async fn run_reasoning_lane(&self, query: &str, user: &UserRef) -> Result<ReasoningLaneResult, AgentError> {
        let user_id = self.resolve_user(user).await?;
        let session = self
            .sessions
            .create_session(&user_id, query, "reasoning", &REASONING_LANE_STEPS)
            .await?;
        info!(session_id = %session.session_id, user_id = %user_id, "Reasoning lane started");

        let outcome = self.reasoning_steps(&session.session_id, &user_id, query).await;
        self.finish(&session.session_id, outcome).await
    }

    async fn resolve_user(&self, user: &UserRef) -> Result<String, AgentError> {
        match user {
            UserRef::Id(id) if id.trim().is_empty() => {
                Err(AgentError::Validation("either a user id or an email must be provided".into()))
            }
            UserRef::Id(id) => Ok(id.clone()),
            UserRef::Email(email) => {
                if email.trim().is_empty() {
                    return Err(AgentError::Validation(
                        "either a user id or an email must be provided".into(),
                    ));
                }
                self.identity
                    .lookup(email)
                    .await?
                    .ok_or_else(|| AgentError::UserNotFound(email.clone()))
            }
        }
    }

    async fn finish<T>(&self, session_id: &str, outcome: Result<T, AgentError>) -> Result<T, AgentError> {
        if let Err(e) = &outcome {
            if let Err(fail_err) = self.sessions.fail_session(session_id, &e.to_string()).await {
                warn!(session_id = %session_id, error = %fail_err, "Could not mark session as failed");
            }
        }
        outcome
    }

    async fn planner_steps(
        &self,
        session_id: &str,
        user_id: &str,
        goal: &str,
        provided_context: Option<&str>,
    ) -> Result<PlannerLaneResult, AgentError> {
        let memory = self.memory_step(session_id, user_id, goal, provided_context).await?;

        let handoff = HandoffPayload::MemoryToPlanner(PlannerInput {
            goal: goal.to_string(),
            context: memory.context.clone(),
        });
        let HandoffPayload::MemoryToPlanner(input) = self.hand_off(session_id, handoff).await? else {
            return Err(self.unexpected_payload(AgentType::Planner));
        };

        let plan = self.plan(&input, true).await?;
        self.record(session_id, AgentType::Planner, &plan).await?;

        let memory_ids = memory.memories.iter().map(|m| m.id.clone()).collect();
        self.sessions.complete_session(session_id, memory_ids).await?;
        info!(session_id = %session_id, steps = plan.plan.len(), "Planner lane complete");

        Ok(PlannerLaneResult {
            session_id: session_id.to_string(),
            estimated_steps: plan.plan.len(),
            plan: plan.plan,
            reasoning: plan.reasoning,
        })
    }

    async fn reasoning_steps(
        &self,
        session_id: &str,
        user_id: &str,
        query: &str,
    ) -> Result<ReasoningLaneResult, AgentError> {
        let memory = self.memory_step(session_id, user_id, query, None).await?;

        let handoff = HandoffPayload::MemoryToPlanner(PlannerInput {
            goal: query.to_string(),
            context: memory.context.clone(),
        });
        let HandoffPayload::MemoryToPlanner(planner_input) = self.hand_off(session_id, handoff).await? else {
            return Err(self.unexpected_payload(AgentType::Planner));
        };
        let plan = self.plan(&planner_input, false).await?;
        self.record(session_id, AgentType::Planner, &plan).await?;

        let handoff = HandoffPayload::PlannerToReasoner(ReasonerInput {
            goal: query.to_string(),
            plan: plan.plan.clone(),
            context: memory.context.clone(),
        });
        let HandoffPayload::PlannerToReasoner(reasoner_input) = self.hand_off(session_id, handoff).await? else {
            return Err(self.unexpected_payload(AgentType::Reasoner));
        };
        let reasoned = self.reason(&reasoner_input, &plan.reasoning).await?;
        self.record(session_id, AgentType::Reasoner, &reasoned).await?;

        let handoff = HandoffPayload::ReasonerToReflector(ReflectorInput {
            result: reasoned.result.clone(),
            reasoning: reasoned.reasoning.clone(),
            insights: reasoned.insights.clone(),
        });
        let HandoffPayload::ReasonerToReflector(reflector_input) = self.hand_off(session_id, handoff).await? else {
            return Err(self.unexpected_payload(AgentType::Reflector));
        };
        let reflection = self.reflect(&reflector_input).await?;
        self.record(session_id, AgentType::Reflector, &reflection).await?;

        self.save_insights(session_id, user_id, &reflection.key_insights).await?;

        let memory_ids = memory.memories.iter().map(|m| m.id.clone()).collect();
        self.sessions.complete_session(session_id, memory_ids).await?;
        info!(
            session_id = %session_id,
            insights = reflection.key_insights.len(),
            "Reasoning lane complete"
        );

        Ok(ReasoningLaneResult {
            session_id: session_id.to_string(),
            result: reasoned.result,
            reflection: reflection.reflection,
            key_insights: reflection.key_insights,
        })
    }

    async fn memory_step(
        &self,
        session_id: &str,
        user_id: &str,
        query: &str,
        provided_context: Option<&str>,
    ) -> Result<MemoryOutput, AgentError> {
        let memories: Vec<MemoryHit> = self
            .fuser
            .search_internal(query, user_id, self.config.memory_limit)
            .await?;
        let retrieved = memories
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let context = match provided_context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(provided) => format!("{}\n\n--- Relevant Memories ---\n{}", provided, retrieved),
            None => retrieved,
        };

        let output = MemoryOutput { memories, context };
        self.record(session_id, AgentType::Memory, &output).await?;
        info!(session_id = %session_id, memories = output.memories.len(), "Memory step done");
        Ok(output)
    }

    async fn hand_off(&self, session_id: &str, payload: HandoffPayload) -> Result<HandoffPayload, AgentError> {
        let data = payload
            .to_value()
            .map_err(|e| AgentError::Validation(format!("handoff payload does not serialize: {}", e)))?;
        self.sessions
            .record_agent_handoff(session_id, payload.from_agent(), payload.to_agent(), data)
            .await
    }

    async fn record<T: Serialize>(&self, session_id: &str, agent: AgentType, output: &T) -> Result<(), AgentError> {
        let value = db::encode(output)?;
        self.sessions.record_agent_execution(session_id, agent, value).await?;
        Ok(())
    }

    fn unexpected_payload(&self, to: AgentType) -> AgentError {
        AgentError::Validation(format!("unexpected handoff payload for {}", to))
    }

    async fn plan(&self, input: &PlannerInput, detailed: bool) -> Result<PlannerOutput, AgentError> {
        let system = if detailed {
            "You are an advanced Planning Agent. Create a detailed, step-by-step execution plan to achieve a goal.\n\n\
             Your plan should be:\n\
             - Actionable: each step is clear and executable\n\
             - Logical: steps follow a sensible sequence\n\
             - Comprehensive: cover everything needed to reach the goal\n\
             - Adaptive: respect the available context and constraints"
        } else {
            "You are a Planning Agent. Create a clear, actionable step-by-step plan to achieve a goal."
        };
        let prompt = format!(
            "Context:\n{}\n\nGoal: {}\n\nReturn a JSON object with:\n\
             - \"plan\": array of step strings\n\
             - \"reasoning\": explanation of why this plan achieves the goal",
            input.context, input.goal
        );
        let temperature = if detailed {
            self.config.planner_temperature
        } else {
            self.config.reasoning_temperature
        };

        let reply = self.ask(system, &prompt, temperature).await?;
        let parsed = extract_json_object(&reply);
        let mut plan = parsed.as_ref().map(|v| string_list(&v["plan"])).unwrap_or_default();
        if plan.is_empty() {
            plan = numbered_lines(&reply);
        }
        let reasoning = parsed.as_ref().map(|v| text_field(&v["reasoning"])).unwrap_or_default();

        Ok(PlannerOutput { plan, reasoning })
    }

    async fn reason(&self, input: &ReasonerInput, planner_reasoning: &str) -> Result<ReasonerOutput, AgentError> {
        let steps = input
            .plan
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Context:\n{}\n\nPlanner's Reasoning:\n{}\n\nPlan Steps:\n{}\n\nGoal: {}\n\n\
             Return a JSON object with:\n\
             - \"result\": the final reasoned answer\n\
             - \"reasoning\": your detailed reasoning process\n\
             - \"insights\": array of key insights discovered",
            input.context, planner_reasoning, steps, input.goal
        );

        let reply = self
            .ask(
                "You are a Reasoning Agent. Perform deep analysis and reasoning to achieve the goal.",
                &prompt,
                self.config.reasoning_temperature,
            )
            .await?;

        Ok(match extract_json_object(&reply) {
            Some(v) => ReasonerOutput {
                result: text_field(&v["result"]),
                reasoning: text_field(&v["reasoning"]),
                insights: string_list(&v["insights"]),
            },
            // Unstructured reply: keep it as the answer
            None => ReasonerOutput {
                result: reply.trim().to_string(),
                reasoning: String::new(),
                insights: Vec::new(),
            },
        })
    }

    async fn reflect(&self, input: &ReflectorInput) -> Result<ReflectorOutput, AgentError> {
        let prompt = format!(
            "Result:\n{}\n\nReasoning Process:\n{}\n\nInsights:\n{}\n\n\
             Return a JSON object with:\n\
             - \"reflection\": your reflection on the process and outcomes\n\
             - \"keyInsights\": array of the most important insights to remember",
            input.result,
            input.reasoning,
            input.insights.join("\n")
        );

        let reply = self
            .ask(
                "You are a Reflection Agent. Reflect on the reasoning process and extract key learnings.",
                &prompt,
                self.config.reasoning_temperature,
            )
            .await?;

        let parsed = extract_json_object(&reply);
        Ok(ReflectorOutput {
            reflection: parsed.as_ref().map(|v| text_field(&v["reflection"])).unwrap_or_default(),
            key_insights: parsed.as_ref().map(|v| string_list(&v["keyInsights"])).unwrap_or_default(),
        })
    }

    async fn ask(&self, system: &str, prompt: &str, temperature: f32) -> Result<String, AgentError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        Ok(self
            .llm
            .complete(&messages, &CompletionOptions::json(temperature))
            .await?)
    }

    async fn save_insights(&self, session_id: &str, user_id: &str, insights: &[String]) -> Result<(), AgentError> {
        let contents: Vec<String> = insights
            .iter()
            .map(|i| i.trim())
            .filter(|i| !i.is_empty())
            .map(|i| format!("{}{}", INSIGHT_PREFIX, i))
            .collect();
        if contents.is_empty() {
            return Ok(());
        }

        let vectors = try_join_all(contents.iter().map(|c| self.embedder.embed(c))).await?;
        let now = Utc::now();
        for (index, (content, vector)) in contents.into_iter().zip(vectors).enumerate() {
            let payload = MemoryPayload {
                owner_id: user_id.to_string(),
                agent_scope: self.config.insight_scope.clone(),
                filename: INSIGHT_SOURCE.to_string(),
                chunk_index: index,
                summary: content.clone(),
                content,
                job_id: None,
                source_type: "insight".to_string(),
                created_at: now,
            };
            let id = format!("insight_{}_{}", session_id, index);
            self.vectors
                .upsert(&self.config.insight_collection, &id, vector, payload)
                .await?;
        }
        self.vectors.flush(&self.config.insight_collection).await?;
        info!(session_id = %session_id, user_id = %user_id, "Reflection insights saved to memory");
        Ok(())
    }
}

static LIST_ITEM: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\d+[.)]|[-*•])\s+(.+?)\s*$").ok());

/// Numbered or bulleted lines from free text.
pub fn numbered_lines(text: &str) -> Vec<String> {
    let Some(re) = LIST_ITEM.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Coerce a model field into a list of strings. Accepts arrays of strings
/// or objects with a step/description, and newline separated text.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(map) => ["step", "description", "title", "text"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(|s| s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => {
            let numbered = numbered_lines(s);
            if numbered.is_empty() {
                s.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()
            } else {
                numbered
            }
        }
        _ => Vec::new(),
    }
}

pub fn text_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(|i| i.as_str().map(String::from).unwrap_or_else(|| i.to_string()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

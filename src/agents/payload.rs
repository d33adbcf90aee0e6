// src/agents/payload.rs
// Typed agent inputs/outputs and the per-edge handoff payloads

use super::graph::AgentType;
use crate::retrieval::MemoryHit;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInput {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryOutput {
    pub memories: Vec<MemoryHit>,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerInput {
    pub goal: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub plan: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerInput {
    pub goal: String,
    pub plan: Vec<String>,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerOutput {
    pub result: String,
    pub reasoning: String,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectorInput {
    pub result: String,
    pub reasoning: String,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectorOutput {
    pub reflection: String,
    pub key_insights: Vec<String>,
}

/// Data carried along one edge of the reasoning graph.
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffPayload {
    MemoryToPlanner(PlannerInput),
    PlannerToReasoner(ReasonerInput),
    ReasonerToReflector(ReflectorInput),
}

impl HandoffPayload {
    pub fn from_agent(&self) -> AgentType {
        match self {
            HandoffPayload::MemoryToPlanner(_) => AgentType::Memory,
            HandoffPayload::PlannerToReasoner(_) => AgentType::Planner,
            HandoffPayload::ReasonerToReflector(_) => AgentType::Reasoner,
        }
    }

    pub fn to_agent(&self) -> AgentType {
        match self {
            HandoffPayload::MemoryToPlanner(_) => AgentType::Planner,
            HandoffPayload::PlannerToReasoner(_) => AgentType::Reasoner,
            HandoffPayload::ReasonerToReflector(_) => AgentType::Reflector,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            HandoffPayload::MemoryToPlanner(p) => serde_json::to_value(p),
            HandoffPayload::PlannerToReasoner(p) => serde_json::to_value(p),
            HandoffPayload::ReasonerToReflector(p) => serde_json::to_value(p),
        }
    }

    /// Typed payload for an edge. Returns None for pairs that are not edges.
    pub fn parse(from: AgentType, to: AgentType, data: Value) -> Option<Result<Self, serde_json::Error>> {
        let parsed = match (from, to) {
            (AgentType::Memory, AgentType::Planner) => {
                serde_json::from_value(data).map(HandoffPayload::MemoryToPlanner)
            }
            (AgentType::Planner, AgentType::Reasoner) => {
                serde_json::from_value(data).map(HandoffPayload::PlannerToReasoner)
            }
            (AgentType::Reasoner, AgentType::Reflector) => {
                serde_json::from_value(data).map(HandoffPayload::ReasonerToReflector)
            }
            _ => return None,
        };
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_edge() {
        let payload = HandoffPayload::parse(
            AgentType::Planner,
            AgentType::Reasoner,
            json!({"goal": "g", "plan": ["step"], "context": ""}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(payload.from_agent(), AgentType::Planner);
        assert_eq!(payload.to_agent(), AgentType::Reasoner);
        assert_eq!(payload.to_value().unwrap()["plan"], json!(["step"]));
    }

    #[test]
    fn test_parse_rejects_non_edges() {
        assert!(HandoffPayload::parse(AgentType::Reflector, AgentType::Memory, json!({})).is_none());
    }

    #[test]
    fn test_reflector_output_uses_camel_case() {
        let out = ReflectorOutput { reflection: "r".into(), key_insights: vec!["k".into()] };
        assert_eq!(serde_json::to_value(&out).unwrap()["keyInsights"], json!(["k"]));
    }
}

// src/agents/graph.rs
// Reasoning graph: Memory -> Planner -> Reasoner -> Reflector

use super::schema::{FieldSchema, FieldType, ObjectSchema, SchemaViolation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Memory,
    Planner,
    Reasoner,
    Reflector,
}

impl AgentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Memory => "memory",
            AgentType::Planner => "planner",
            AgentType::Reasoner => "reasoner",
            AgentType::Reflector => "reflector",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub agent: AgentType,
    pub name: &'static str,
    pub description: &'static str,
    pub input: ObjectSchema,
    pub output: ObjectSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffViolation {
    #[error("no edge from {from} to {to}")]
    UnknownEdge { from: AgentType, to: AgentType },
    #[error("{agent} output contract: {violation}")]
    Sender { agent: AgentType, violation: SchemaViolation },
    #[error("{agent} input contract: {violation}")]
    Receiver { agent: AgentType, violation: SchemaViolation },
}

#[derive(Debug, Clone)]
pub struct AgentGraph {
    nodes: Vec<AgentDefinition>,
    edges: Vec<(AgentType, AgentType)>,
}

pub static REASONING_GRAPH: Lazy<AgentGraph> = Lazy::new(AgentGraph::reasoning);

impl AgentGraph {
    pub fn reasoning() -> Self {
        use FieldType::*;

        let nodes = vec![
            AgentDefinition {
                agent: AgentType::Memory,
                name: "Memory Agent",
                description: "Retrieves relevant memories and context",
                input: ObjectSchema::new(&[FieldSchema::new("query", String).non_empty()]),
                output: ObjectSchema::new(&[
                    FieldSchema::new("memories", Array),
                    FieldSchema::new("context", String),
                ]),
            },
            AgentDefinition {
                agent: AgentType::Planner,
                name: "Planning Agent",
                description: "Creates an execution plan from the goal and context",
                input: ObjectSchema::new(&[
                    FieldSchema::new("goal", String).non_empty(),
                    FieldSchema::new("context", String),
                ]),
                output: ObjectSchema::new(&[
                    FieldSchema::new("plan", StringArray),
                    FieldSchema::new("reasoning", String),
                ]),
            },
            AgentDefinition {
                agent: AgentType::Reasoner,
                name: "Reasoning Agent",
                description: "Works through the plan to reach a result",
                input: ObjectSchema::new(&[
                    FieldSchema::new("goal", String).non_empty(),
                    FieldSchema::new("plan", StringArray).non_empty(),
                    FieldSchema::new("context", String),
                ]),
                output: ObjectSchema::new(&[
                    FieldSchema::new("result", String),
                    FieldSchema::new("reasoning", String),
                    FieldSchema::new("insights", StringArray),
                ]),
            },
            AgentDefinition {
                agent: AgentType::Reflector,
                name: "Reflection Agent",
                description: "Reflects on the reasoning and extracts insights worth keeping",
                input: ObjectSchema::new(&[
                    FieldSchema::new("result", String),
                    FieldSchema::new("reasoning", String),
                    FieldSchema::new("insights", StringArray),
                ]),
                output: ObjectSchema::new(&[
                    FieldSchema::new("reflection", String),
                    FieldSchema::new("keyInsights", StringArray),
                ]),
            },
        ];

        let edges = vec![
            (AgentType::Memory, AgentType::Planner),
            (AgentType::Planner, AgentType::Reasoner),
            (AgentType::Reasoner, AgentType::Reflector),
        ];

        Self { nodes, edges }
    }

    pub fn definition(&self, agent: AgentType) -> Option<&AgentDefinition> {
        self.nodes.iter().find(|n| n.agent == agent)
    }

    pub fn next_agent(&self, from: AgentType) -> Option<AgentType> {
        self.edges.iter().find(|(f, _)| *f == from).map(|(_, to)| *to)
    }

    pub fn has_edge(&self, from: AgentType, to: AgentType) -> bool {
        self.edges.iter().any(|edge| *edge == (from, to))
    }

    /// True when `steps` is a non-empty walk along graph edges.
    pub fn is_path(&self, steps: &[AgentType]) -> bool {
        !steps.is_empty() && steps.windows(2).all(|w| self.has_edge(w[0], w[1]))
    }

    /// Handoff data must not contradict the sender's output contract and
    /// must fully satisfy the receiver's input contract.
    pub fn validate_handoff(&self, from: AgentType, to: AgentType, data: &Value) -> Result<(), HandoffViolation> {
        let (Some(sender), Some(receiver)) = (self.definition(from), self.definition(to)) else {
            return Err(HandoffViolation::UnknownEdge { from, to });
        };
        if !self.has_edge(from, to) {
            return Err(HandoffViolation::UnknownEdge { from, to });
        }

        sender
            .output
            .validate_present(data)
            .map_err(|violation| HandoffViolation::Sender { agent: from, violation })?;
        receiver
            .input
            .validate(data)
            .map_err(|violation| HandoffViolation::Receiver { agent: to, violation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_agent_walks_chain() {
        let g = &*REASONING_GRAPH;
        assert_eq!(g.next_agent(AgentType::Memory), Some(AgentType::Planner));
        assert_eq!(g.next_agent(AgentType::Reasoner), Some(AgentType::Reflector));
        assert_eq!(g.next_agent(AgentType::Reflector), None);
    }

    #[test]
    fn test_paths() {
        let g = &*REASONING_GRAPH;
        assert!(g.is_path(&[AgentType::Memory, AgentType::Planner]));
        assert!(!g.is_path(&[AgentType::Memory, AgentType::Reasoner]));
        assert!(!g.is_path(&[]));
    }

    #[test]
    fn test_handoff_validation() {
        let g = &*REASONING_GRAPH;
        assert!(g
            .validate_handoff(AgentType::Memory, AgentType::Planner, &json!({"goal": "g", "context": "c"}))
            .is_ok());

        // plan must be non-empty for the reasoner
        let err = g
            .validate_handoff(
                AgentType::Planner,
                AgentType::Reasoner,
                &json!({"goal": "g", "plan": [], "context": "c"}),
            )
            .unwrap_err();
        assert!(matches!(err, HandoffViolation::Receiver { agent: AgentType::Reasoner, .. }));

        // context contradicts the memory agent's output contract
        let err = g
            .validate_handoff(AgentType::Memory, AgentType::Planner, &json!({"goal": "g", "context": 7}))
            .unwrap_err();
        assert!(matches!(err, HandoffViolation::Sender { agent: AgentType::Memory, .. }));

        assert!(matches!(
            g.validate_handoff(AgentType::Memory, AgentType::Reflector, &json!({})),
            Err(HandoffViolation::UnknownEdge { .. })
        ));
    }
}

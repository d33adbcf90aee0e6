//! Per-user meta-learning state.

use crate::retrieval::scoring::FusionWeights;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const META_STATE_COLLECTION: &str = "meta_learning_state";

pub const MIN_INTERNAL_WEIGHT: f64 = 0.3;
pub const MAX_INTERNAL_WEIGHT: f64 = 0.8;
pub const MIN_LEARNING_RATE: f64 = 0.005;
pub const MAX_LEARNING_RATE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStrategy {
    Conservative,
    Balanced,
    Aggressive,
}

impl LearningStrategy {
    /// High satisfaction means current weights work; move them less.
    pub fn from_satisfaction(avg_satisfaction: f64) -> Self {
        if avg_satisfaction > 0.8 {
            LearningStrategy::Conservative
        } else if avg_satisfaction > 0.6 {
            LearningStrategy::Balanced
        } else {
            LearningStrategy::Aggressive
        }
    }

    pub fn step_factor(self) -> f64 {
        match self {
            LearningStrategy::Conservative => 0.5,
            LearningStrategy::Balanced => 0.75,
            LearningStrategy::Aggressive => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaLearningState {
    pub user_id: String,
    pub internal_weight: f64,
    pub external_weight: f64,
    pub learning_rate: f64,
    pub avg_satisfaction: f64,
    pub total_queries: u64,
    pub strategy: LearningStrategy,
    pub last_updated: DateTime<Utc>,
    /// Feedback at or before this instant has already been learned from.
    #[serde(default)]
    pub last_learned_at: Option<DateTime<Utc>>,
}

impl MetaLearningState {
    pub fn new(user_id: &str, defaults: FusionWeights, learning_rate: f64) -> Self {
        let defaults = defaults.normalized();
        Self {
            user_id: user_id.to_string(),
            internal_weight: defaults.internal,
            external_weight: defaults.external,
            learning_rate: learning_rate.clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE),
            avg_satisfaction: 0.5,
            total_queries: 0,
            strategy: LearningStrategy::Balanced,
            last_updated: Utc::now(),
            last_learned_at: None,
        }
    }

    pub fn weights(&self) -> FusionWeights {
        FusionWeights::new(self.internal_weight, self.external_weight)
    }
}

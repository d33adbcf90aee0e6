//! Fusion arithmetic: source weights, rank decay and result ordering.

use serde::{Deserialize, Serialize};

pub const EXTERNAL_ID_PREFIX: &str = "external_";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionWeights {
    pub internal: f64,
    pub external: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { internal: 0.6, external: 0.4 }
    }
}

impl FusionWeights {
    pub fn new(internal: f64, external: f64) -> Self {
        Self { internal, external }
    }

    /// Weights that sum to 1. Degenerate input falls back to the default split.
    pub fn normalized(self) -> Self {
        if !self.internal.is_finite() || !self.external.is_finite() {
            return Self::default();
        }
        let internal = self.internal.max(0.0);
        let external = self.external.max(0.0);
        let sum = internal + external;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::default();
        }
        Self { internal: internal / sum, external: external / sum }
    }
}

/// How confidence decays with the provider's rank for external results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RankDecay {
    /// `max(floor, 1 - step * rank)`
    Linear { step: f64, floor: f64 },
    /// `max(floor, (1 - rate) ^ rank)`
    Exponential { rate: f64, floor: f64 },
}

impl Default for RankDecay {
    fn default() -> Self {
        RankDecay::Linear { step: 0.1, floor: 0.3 }
    }
}

impl RankDecay {
    /// Confidence for a zero-based rank, always within `[0, 1]`.
    pub fn confidence(&self, rank: usize) -> f64 {
        let raw = match *self {
            RankDecay::Linear { step, floor } => (1.0 - step * rank as f64).max(floor),
            RankDecay::Exponential { rate, floor } => {
                (1.0 - rate).clamp(0.0, 1.0).powi(rank as i32).max(floor)
            }
        };
        raw.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Internal,
    External,
}

impl ResultSource {
    /// External result ids carry a fixed prefix; everything else is internal.
    pub fn from_result_id(id: &str) -> Self {
        if id.starts_with(EXTERNAL_ID_PREFIX) {
            ResultSource::External
        } else {
            ResultSource::Internal
        }
    }
}

pub fn fused_score(confidence: f64, weight: f64) -> f64 {
    confidence.clamp(0.0, 1.0) * weight
}

//! Adaptive per-user fusion weights.
//!
//! Learned weights are only trusted once the user has produced enough
//! signal; until then callers get their own defaults back. Weight changes
//! come exclusively from batch learning and move by at most
//! `learning_rate * strategy factor` per run.

use super::state::{
    LearningStrategy, MetaLearningState, MAX_INTERNAL_WEIGHT, MAX_LEARNING_RATE,
    META_STATE_COLLECTION, MIN_INTERNAL_WEIGHT, MIN_LEARNING_RATE,
};
use super::LearningError;
use crate::db::{self, DocumentStore, StoreError};
use crate::monitoring::metrics::WEIGHT_UPDATES_TOTAL;
use crate::retrieval::scoring::FusionWeights;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    pub default_weights: FusionWeights,
    /// Learned weights are used only when confidence is strictly above this.
    pub confidence_threshold: f64,
    pub learning_rate: f64,
    pub learning_window_hours: u64,
    pub min_split_samples: usize,
    pub max_write_attempts: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            default_weights: FusionWeights::default(),
            confidence_threshold: 0.6,
            learning_rate: 0.05,
            learning_window_hours: 24,
            min_split_samples: 3,
            max_write_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightSource {
    Default,
    Learned,
    Optimized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWeights {
    pub internal: f64,
    pub external: f64,
    pub source: WeightSource,
    pub confidence: f64,
}

/// One feedback signal prepared for learning.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningSample {
    pub satisfaction: f64,
    /// Weight split in effect when the query ran, if known.
    pub weights_used: Option<FusionWeights>,
    /// Share of the results marked useful that came from internal memory.
    pub internal_share: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightUpdate {
    pub user_id: String,
    pub previous: FusionWeights,
    pub current: FusionWeights,
    pub samples: usize,
    pub avg_satisfaction_before: f64,
    pub avg_satisfaction_after: f64,
    pub strategy: LearningStrategy,
    pub learning_rate: f64,
}

pub fn learning_confidence(state: &MetaLearningState) -> f64 {
    let total = state.total_queries as f64;
    let mut confidence: f64 = 0.5;
    if state.total_queries > 50 {
        confidence = (0.5 + total / 1000.0 * 0.5).min(0.95);
    }
    if state.avg_satisfaction > 0.7 && state.total_queries > 20 {
        confidence = (confidence + 0.2).min(0.95);
    }
    confidence
}

pub fn weight_source(state: &MetaLearningState) -> WeightSource {
    if state.total_queries > 50 && state.avg_satisfaction > 0.7 {
        WeightSource::Optimized
    } else if state.total_queries > 10 {
        WeightSource::Learned
    } else {
        WeightSource::Default
    }
}

/// Satisfaction observed while serving one internal-weight split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitObservation {
    pub internal: f64,
    pub samples: usize,
    pub avg_satisfaction: f64,
}

/// Group samples by the split they were served with, rounded to whole
/// percent. Splits with fewer than `min_samples` samples are dropped.
pub fn observed_splits(samples: &[LearningSample], min_samples: usize) -> Vec<SplitObservation> {
    let mut splits: BTreeMap<i64, (usize, f64)> = BTreeMap::new();
    for sample in samples {
        if let Some(w) = sample.weights_used {
            let key = (w.normalized().internal * 100.0).round() as i64;
            let entry = splits.entry(key).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += sample.satisfaction;
        }
    }

    splits
        .into_iter()
        .filter(|(_, (count, _))| *count >= min_samples.max(1))
        .map(|(key, (count, sum))| SplitObservation {
            internal: key as f64 / 100.0,
            samples: count,
            avg_satisfaction: sum / count as f64,
        })
        .collect()
}

/// Highest average satisfaction; more samples break ties.
pub fn best_observed_split(splits: &[SplitObservation]) -> Option<SplitObservation> {
    splits.iter().copied().max_by(|a, b| {
        a.avg_satisfaction
            .partial_cmp(&b.avg_satisfaction)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.samples.cmp(&b.samples))
    })
}

/// Internal weight the evidence points at, if any.
///
/// Prefers the best-satisfying observed split when at least two splits have
/// `min_split_samples` samples each. Otherwise uses the satisfaction-weighted
/// internal share of useful results.
pub fn estimate_target(samples: &[LearningSample], min_split_samples: usize) -> Option<f64> {
    let splits = observed_splits(samples, min_split_samples);
    if splits.len() >= 2 {
        return best_observed_split(&splits).map(|s| s.internal);
    }

    let (weighted, total) = samples
        .iter()
        .filter_map(|s| s.internal_share.map(|share| (share.clamp(0.0, 1.0), s.satisfaction)))
        .fold((0.0, 0.0), |(w, t), (share, sat)| (w + share * sat, t + sat));

    (total > 0.0).then(|| weighted / total)
}

/// Fold one batch of unseen samples into a state. Returns None when the
/// batch is empty.
pub fn next_state(
    state: &MetaLearningState,
    samples: &[LearningSample],
    min_split_samples: usize,
    now: DateTime<Utc>,
) -> Option<(MetaLearningState, WeightUpdate)> {
    let newest = samples.iter().map(|s| s.created_at).max()?;
    let n = samples.len() as f64;
    let batch_sum: f64 = samples.iter().map(|s| s.satisfaction.clamp(0.0, 1.0)).sum();
    let batch_avg = batch_sum / n;

    let prev_total = state.total_queries as f64;
    let avg_satisfaction = if state.total_queries == 0 {
        batch_avg
    } else {
        (state.avg_satisfaction * prev_total + batch_sum) / (prev_total + n)
    };

    let strategy = LearningStrategy::from_satisfaction(avg_satisfaction);
    let max_step = state.learning_rate * strategy.step_factor();

    let current = state.internal_weight;
    let internal = match estimate_target(samples, min_split_samples) {
        Some(target) => current + (target - current).clamp(-max_step, max_step),
        None => current,
    }
    .clamp(MIN_INTERNAL_WEIGHT, MAX_INTERNAL_WEIGHT);

    // Stable satisfaction lets the rate settle; swings speed it up
    let learning_rate = if (batch_avg - state.avg_satisfaction).abs() < 0.05 {
        state.learning_rate * 0.95
    } else {
        state.learning_rate * 1.05
    }
    .clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE);

    let next = MetaLearningState {
        user_id: state.user_id.clone(),
        internal_weight: internal,
        external_weight: 1.0 - internal,
        learning_rate,
        avg_satisfaction,
        total_queries: state.total_queries + samples.len() as u64,
        strategy,
        last_updated: now,
        last_learned_at: Some(state.last_learned_at.map_or(newest, |prev| prev.max(newest))),
    };

    let update = WeightUpdate {
        user_id: state.user_id.clone(),
        previous: state.weights(),
        current: next.weights(),
        samples: samples.len(),
        avg_satisfaction_before: state.avg_satisfaction,
        avg_satisfaction_after: avg_satisfaction,
        strategy,
        learning_rate,
    };

    Some((next, update))
}

pub struct AdaptiveWeightController {
    store: Arc<dyn DocumentStore>,
    config: LearningConfig,
}

impl AdaptiveWeightController {
    pub fn new(store: Arc<dyn DocumentStore>, config: LearningConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    fn default_state(&self, user_id: &str) -> MetaLearningState {
        MetaLearningState::new(user_id, self.config.default_weights, self.config.learning_rate)
    }

    /// Stored state with its version, or a fresh default at version 0.
    /// Reading never writes.
    async fn load_state(&self, user_id: &str) -> Result<(u64, MetaLearningState), StoreError> {
        Ok(db::load_versioned(self.store.as_ref(), META_STATE_COLLECTION, user_id)
            .await?
            .unwrap_or_else(|| (0, self.default_state(user_id))))
    }

    pub async fn get_state(&self, user_id: &str) -> Result<MetaLearningState, LearningError> {
        Ok(self.load_state(user_id).await?.1)
    }

    pub async fn get_adaptive_weights(&self, user_id: &str) -> Result<AdaptiveWeights, LearningError> {
        let state = self.get_state(user_id).await?;
        let weights = state.weights().normalized();
        Ok(AdaptiveWeights {
            internal: weights.internal,
            external: weights.external,
            source: weight_source(&state),
            confidence: learning_confidence(&state),
        })
    }

    /// Learned weights when trusted, else exactly the given defaults. Never fails.
    pub async fn get_weights_with_fallback(
        &self,
        user_id: &str,
        default_internal: f64,
        default_external: f64,
    ) -> FusionWeights {
        let defaults = FusionWeights::new(default_internal, default_external);
        if user_id.trim().is_empty() {
            return defaults;
        }

        match self.get_adaptive_weights(user_id).await {
            Ok(w) if w.confidence > self.config.confidence_threshold => {
                debug!(user_id = %user_id, confidence = w.confidence, source = ?w.source, "Using learned weights");
                FusionWeights::new(w.internal, w.external)
            }
            Ok(_) => defaults,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load learned weights; using defaults");
                defaults
            }
        }
    }

    /// Restore default weights, learning rate and strategy. Query history and
    /// the learned-through marker are kept so old feedback is not re-applied.
    pub async fn reset_user_weights(&self, user_id: &str) -> Result<MetaLearningState, LearningError> {
        let (_, current) = self.load_state(user_id).await?;
        let mut reset = self.default_state(user_id);
        reset.total_queries = current.total_queries;
        reset.avg_satisfaction = current.avg_satisfaction;
        reset.last_learned_at = current.last_learned_at;

        db::save(self.store.as_ref(), META_STATE_COLLECTION, user_id, &reset).await?;
        info!(user_id = %user_id, "User weights reset to defaults");
        Ok(reset)
    }

    /// Apply samples newer than the stored `last_learned_at`. Writes are
    /// conditional on the version read; a conflicting concurrent run causes a
    /// re-read, so each sample is learned from at most once.
    pub async fn apply_batch(
        &self,
        user_id: &str,
        samples: &[LearningSample],
    ) -> Result<Option<WeightUpdate>, LearningError> {
        let attempts = self.config.max_write_attempts.max(1);

        for attempt in 1..=attempts {
            let (version, state) = self.load_state(user_id).await?;
            let unseen: Vec<LearningSample> = samples
                .iter()
                .filter(|s| state.last_learned_at.map_or(true, |t| s.created_at > t))
                .cloned()
                .collect();

            let Some((next, update)) =
                next_state(&state, &unseen, self.config.min_split_samples, Utc::now())
            else {
                debug!(user_id = %user_id, "No new feedback to learn from");
                return Ok(None);
            };

            let body = db::encode(&next)?;
            match self
                .store
                .put_if_version(META_STATE_COLLECTION, user_id, version, body)
                .await
            {
                Ok(_) => {
                    WEIGHT_UPDATES_TOTAL.inc();
                    info!(
                        user_id = %user_id,
                        samples = update.samples,
                        internal_before = update.previous.internal,
                        internal_after = update.current.internal,
                        strategy = ?update.strategy,
                        "Weights updated"
                    );
                    return Ok(Some(update));
                }
                Err(StoreError::VersionConflict { .. }) => {
                    warn!(user_id = %user_id, attempt, "Learning state changed concurrently; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LearningError::Conflict {
            user_id: user_id.to_string(),
            attempts,
        })
    }
}

//! Per-search performance records.

use crate::db::{self, DocumentStore, StoreError};
use crate::retrieval::scoring::FusionWeights;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const PERFORMANCE_COLLECTION: &str = "performance_metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultQuality {
    High,
    Medium,
    Low,
}

impl ResultQuality {
    pub fn classify(avg_confidence: f64, result_count: usize, avg_fused_score: f64) -> Self {
        if avg_confidence > 0.7 && result_count >= 3 && avg_fused_score > 0.5 {
            ResultQuality::High
        } else if avg_confidence < 0.4 || result_count < 2 || avg_fused_score < 0.3 {
            ResultQuality::Low
        } else {
            ResultQuality::Medium
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub weights: FusionWeights,
    pub internal_count: usize,
    pub external_count: usize,
    pub avg_confidence: f64,
    pub avg_fused_score: f64,
    pub response_time_ms: u64,
    pub result_quality: ResultQuality,
    pub created_at: DateTime<Utc>,
}

impl PerformanceMetric {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        query: &str,
        weights: FusionWeights,
        internal_count: usize,
        external_count: usize,
        avg_confidence: f64,
        avg_fused_score: f64,
        response_time_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            weights,
            internal_count,
            external_count,
            avg_confidence,
            avg_fused_score,
            response_time_ms,
            result_quality: ResultQuality::classify(
                avg_confidence,
                internal_count + external_count,
                avg_fused_score,
            ),
            created_at: Utc::now(),
        }
    }

    pub fn total_results(&self) -> usize {
        self.internal_count + self.external_count
    }
}

pub struct PerformanceTracker {
    store: Arc<dyn DocumentStore>,
}

impl PerformanceTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, metric: &PerformanceMetric) -> Result<(), StoreError> {
        db::save(self.store.as_ref(), PERFORMANCE_COLLECTION, &metric.id, metric).await?;
        debug!(user_id = %metric.user_id, quality = ?metric.result_quality, "Performance metric recorded");
        Ok(())
    }

    /// Metrics created at or after `since`, oldest first, optionally for one user.
    pub async fn list_since(
        &self,
        since: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<PerformanceMetric>, StoreError> {
        let mut metrics: Vec<PerformanceMetric> = db::load_all(self.store.as_ref(), PERFORMANCE_COLLECTION)
            .await?
            .into_iter()
            .filter(|m: &PerformanceMetric| m.created_at >= since)
            .filter(|m| user_id.map_or(true, |u| m.user_id == u))
            .collect();
        metrics.sort_by_key(|m| m.created_at);
        Ok(metrics)
    }
}

//! Feedback intake, rollups and the batch learning driver.

use super::performance::{PerformanceMetric, PerformanceTracker, ResultQuality};
use super::weights::{best_observed_split, observed_splits, AdaptiveWeightController, LearningSample, WeightUpdate};
use super::FeedbackError;
use crate::cache::normalize_query;
use crate::db::{self, DocumentStore};
use crate::monitoring::metrics::{FEEDBACK_TOTAL, LEARNING_RUNS_TOTAL};
use crate::retrieval::scoring::{FusionWeights, ResultSource};
use crate::time_window;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const FEEDBACK_COLLECTION: &str = "feedback";

const SLOW_RESPONSE_MS: f64 = 2000.0;

/// Search context captured alongside a feedback signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackContext {
    #[serde(default)]
    pub internal_count: usize,
    #[serde(default)]
    pub external_count: usize,
    #[serde(default)]
    pub avg_confidence: f64,
    #[serde(default)]
    pub avg_fused_score: f64,
    #[serde(default)]
    pub weights: Option<FusionWeights>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: String,
    pub query: String,
    pub user_id: String,
    pub result_ids: Vec<String>,
    pub satisfaction: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub context: Option<FeedbackContext>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackSubmission {
    pub query: String,
    pub user_id: String,
    /// Results the user found useful.
    pub result_ids: Vec<String>,
    pub satisfaction: f64,
    pub feedback: Option<String>,
    pub context: Option<FeedbackContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPatterns {
    pub avg_satisfaction: f64,
    pub total_feedback: usize,
    pub common_issues: Vec<String>,
    pub improvement_suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPerformanceStats {
    pub total_searches: usize,
    pub unique_users: usize,
    pub avg_confidence: f64,
    pub avg_response_time: f64,
    pub avg_satisfaction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPerformanceStats {
    pub user_id: String,
    pub total_searches: usize,
    pub avg_confidence: f64,
    pub avg_fused_score: f64,
    pub avg_response_time: f64,
    pub avg_internal_results: f64,
    pub avg_external_results: f64,
    pub quality_distribution: QualityDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAnalysis {
    pub avg_satisfaction: f64,
    pub avg_response_time: f64,
    pub optimal_weights: Option<FusionWeights>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLearningSummary {
    pub users_considered: usize,
    pub users_updated: usize,
    pub users_failed: usize,
    pub updates: Vec<WeightUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfImprovementReport {
    pub feedback: FeedbackPatterns,
    pub system: SystemPerformanceStats,
    pub performance: PerformanceAnalysis,
    pub learning: Option<BatchLearningSummary>,
    pub generated_at: DateTime<Utc>,
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Share of useful results that came from internal memory.
fn internal_share(result_ids: &[String]) -> Option<f64> {
    if result_ids.is_empty() {
        return None;
    }
    let internal = result_ids
        .iter()
        .filter(|id| ResultSource::from_result_id(id) == ResultSource::Internal)
        .count();
    Some(internal as f64 / result_ids.len() as f64)
}

pub struct FeedbackAggregator {
    store: Arc<dyn DocumentStore>,
    controller: Arc<AdaptiveWeightController>,
    tracker: Arc<PerformanceTracker>,
}

impl FeedbackAggregator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        controller: Arc<AdaptiveWeightController>,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        Self { store, controller, tracker }
    }

    pub async fn submit_feedback(&self, submission: FeedbackSubmission) -> Result<FeedbackRecord, FeedbackError> {
        if submission.query.trim().is_empty() {
            return Err(FeedbackError::Validation("query must not be empty".into()));
        }
        if submission.user_id.trim().is_empty() {
            return Err(FeedbackError::Validation("userId must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&submission.satisfaction) {
            return Err(FeedbackError::Validation(format!(
                "satisfaction must be within [0, 1], got {}",
                submission.satisfaction
            )));
        }

        let record = FeedbackRecord {
            id: Uuid::new_v4().to_string(),
            query: submission.query,
            user_id: submission.user_id,
            result_ids: submission.result_ids,
            satisfaction: submission.satisfaction,
            feedback: submission.feedback.filter(|f| !f.trim().is_empty()),
            context: submission.context,
            created_at: Utc::now(),
        };

        db::save(self.store.as_ref(), FEEDBACK_COLLECTION, &record.id, &record).await?;
        FEEDBACK_TOTAL.inc();
        info!(
            user_id = %record.user_id,
            satisfaction = record.satisfaction,
            results = record.result_ids.len(),
            "Feedback recorded"
        );
        Ok(record)
    }

    /// Most recent feedback for a user, newest first.
    pub async fn get_user_feedback(&self, user_id: &str, limit: usize) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        let mut records: Vec<FeedbackRecord> = self
            .all_feedback()
            .await?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn analyze_feedback_patterns(&self, days_back: u32) -> Result<FeedbackPatterns, FeedbackError> {
        let records = self.feedback_since(since_days(days_back), None).await?;

        if records.is_empty() {
            return Ok(FeedbackPatterns {
                avg_satisfaction: 0.5,
                total_feedback: 0,
                common_issues: vec!["No feedback data available yet".to_string()],
                improvement_suggestions: vec![
                    "Encourage users to provide feedback on search results".to_string(),
                ],
            });
        }

        let total = records.len();
        let avg = mean(records.iter().map(|r| r.satisfaction));
        let low = records.iter().filter(|r| r.satisfaction < 0.5).count();
        let with_text = records.iter().filter(|r| r.feedback.is_some()).count();

        let mut common_issues = Vec::new();
        if avg < 0.6 {
            common_issues.push("Overall satisfaction is below optimal threshold".to_string());
        }
        if low as f64 / total as f64 > 0.3 {
            common_issues.push("High proportion of low-satisfaction queries detected".to_string());
        }

        let mut improvement_suggestions = Vec::new();
        if avg < 0.7 {
            improvement_suggestions
                .push("Consider adjusting hybrid search weights based on feedback patterns".to_string());
        }
        if low > 0 {
            improvement_suggestions
                .push("Review low-satisfaction queries to identify improvement opportunities".to_string());
        }
        if (with_text as f64 / total as f64) < 0.2 {
            improvement_suggestions.push("Encourage more detailed text feedback from users".to_string());
        }

        Ok(FeedbackPatterns {
            avg_satisfaction: avg,
            total_feedback: total,
            common_issues,
            improvement_suggestions,
        })
    }

    pub async fn get_system_performance_stats(&self, days_back: u32) -> Result<SystemPerformanceStats, FeedbackError> {
        let since = since_days(days_back);
        let metrics = self.tracker.list_since(since, None).await?;
        let feedback = self.feedback_since(since, None).await?;

        let unique_users: HashSet<&str> = metrics.iter().map(|m| m.user_id.as_str()).collect();

        Ok(SystemPerformanceStats {
            total_searches: metrics.len(),
            unique_users: unique_users.len(),
            avg_confidence: mean(metrics.iter().map(|m| m.avg_confidence)),
            avg_response_time: mean(metrics.iter().map(|m| m.response_time_ms as f64)),
            avg_satisfaction: mean(feedback.iter().map(|r| r.satisfaction)),
        })
    }

    pub async fn get_user_performance_stats(
        &self,
        user_id: &str,
        days_back: u32,
    ) -> Result<UserPerformanceStats, FeedbackError> {
        let metrics = self.tracker.list_since(since_days(days_back), Some(user_id)).await?;

        let mut quality_distribution = QualityDistribution::default();
        for m in &metrics {
            match m.result_quality {
                ResultQuality::High => quality_distribution.high += 1,
                ResultQuality::Medium => quality_distribution.medium += 1,
                ResultQuality::Low => quality_distribution.low += 1,
            }
        }

        Ok(UserPerformanceStats {
            user_id: user_id.to_string(),
            total_searches: metrics.len(),
            avg_confidence: mean(metrics.iter().map(|m| m.avg_confidence)),
            avg_fused_score: mean(metrics.iter().map(|m| m.avg_fused_score)),
            avg_response_time: mean(metrics.iter().map(|m| m.response_time_ms as f64)),
            avg_internal_results: mean(metrics.iter().map(|m| m.internal_count as f64)),
            avg_external_results: mean(metrics.iter().map(|m| m.external_count as f64)),
            quality_distribution,
        })
    }

    pub async fn analyze_performance_metrics(
        &self,
        user_id: Option<&str>,
        days_back: u32,
    ) -> Result<PerformanceAnalysis, FeedbackError> {
        let since = since_days(days_back);
        let metrics = self.tracker.list_since(since, user_id).await?;
        let samples: Vec<LearningSample> = self
            .collect_samples(since, user_id)
            .await?
            .into_values()
            .flatten()
            .collect();

        let avg_satisfaction = if samples.is_empty() {
            0.5
        } else {
            mean(samples.iter().map(|s| s.satisfaction))
        };
        let avg_response_time = mean(metrics.iter().map(|m| m.response_time_ms as f64));
        let splits = observed_splits(&samples, self.controller.config().min_split_samples);
        let optimal_weights =
            best_observed_split(&splits).map(|s| FusionWeights::new(s.internal, 1.0 - s.internal));
        let baseline = self.controller.config().default_weights.normalized();

        let mut recommendations = Vec::new();
        if avg_satisfaction < 0.6 {
            recommendations.push(
                "Average satisfaction is below 0.6; review fusion weights and retrieval quality".to_string(),
            );
        }
        if avg_response_time > SLOW_RESPONSE_MS {
            recommendations.push(
                "Average response time exceeds 2 seconds; consider reducing result limits or relying more on cached external results".to_string(),
            );
        }
        if let Some(optimal) = optimal_weights {
            if (optimal.internal - baseline.internal).abs() > 0.1 {
                recommendations.push(format!(
                    "Observed best split is {:.0}% internal / {:.0}% external; consider adopting it as the default",
                    optimal.internal * 100.0,
                    optimal.external * 100.0
                ));
            }
        }
        if recommendations.is_empty() {
            recommendations.push("Performance is optimal. Continue monitoring.".to_string());
        }

        Ok(PerformanceAnalysis {
            avg_satisfaction,
            avg_response_time,
            optimal_weights,
            recommendations,
        })
    }

    /// Learn from feedback in the configured window, one user at a time.
    /// A failure for one user is logged and does not stop the others.
    pub async fn run_batch_learning(&self, user_id: Option<&str>) -> Result<BatchLearningSummary, FeedbackError> {
        LEARNING_RUNS_TOTAL.inc();
        let window = time_window::hours(self.controller.config().learning_window_hours);
        let by_user = self
            .collect_samples(time_window::cutoff(Utc::now(), window), user_id)
            .await?;

        let mut summary = BatchLearningSummary {
            users_considered: by_user.len(),
            ..Default::default()
        };

        for (user, samples) in by_user {
            match self.controller.apply_batch(&user, &samples).await {
                Ok(Some(update)) => {
                    summary.users_updated += 1;
                    summary.updates.push(update);
                }
                Ok(None) => {}
                Err(e) => {
                    summary.users_failed += 1;
                    warn!(user_id = %user, error = %e, "Batch learning failed for user");
                }
            }
        }

        info!(
            users_considered = summary.users_considered,
            users_updated = summary.users_updated,
            users_failed = summary.users_failed,
            "Batch learning run finished"
        );
        Ok(summary)
    }

    pub async fn run_self_improvement(
        &self,
        user_id: Option<&str>,
        days_back: u32,
        apply_learning: bool,
    ) -> Result<SelfImprovementReport, FeedbackError> {
        let feedback = self.analyze_feedback_patterns(days_back).await?;
        let system = self.get_system_performance_stats(days_back).await?;
        let performance = self.analyze_performance_metrics(user_id, days_back).await?;
        let learning = if apply_learning {
            Some(self.run_batch_learning(user_id).await?)
        } else {
            None
        };

        Ok(SelfImprovementReport {
            feedback,
            system,
            performance,
            learning,
            generated_at: Utc::now(),
        })
    }

    /// Feedback since `since`, turned into learning samples grouped by user.
    /// The weight split comes from the feedback context when present,
    /// otherwise from the latest matching search metric at or before the
    /// feedback time.
    async fn collect_samples(
        &self,
        since: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<HashMap<String, Vec<LearningSample>>, FeedbackError> {
        let feedback = self.feedback_since(since, user_id).await?;
        let metrics = self
            .tracker
            .list_since(time_window::cutoff(since, Duration::hours(1)), user_id)
            .await?;

        let mut metrics_by_key: HashMap<(String, String), Vec<&PerformanceMetric>> = HashMap::new();
        for m in &metrics {
            metrics_by_key
                .entry((m.user_id.clone(), normalize_query(&m.query)))
                .or_default()
                .push(m);
        }

        let mut by_user: HashMap<String, Vec<LearningSample>> = HashMap::new();
        for record in feedback {
            let weights_used = record
                .context
                .as_ref()
                .and_then(|c| c.weights)
                .or_else(|| {
                    metrics_by_key
                        .get(&(record.user_id.clone(), normalize_query(&record.query)))
                        .and_then(|ms| ms.iter().rev().find(|m| m.created_at <= record.created_at))
                        .map(|m| m.weights)
                });

            by_user.entry(record.user_id.clone()).or_default().push(LearningSample {
                satisfaction: record.satisfaction,
                weights_used,
                internal_share: internal_share(&record.result_ids),
                created_at: record.created_at,
            });
        }
        Ok(by_user)
    }

    async fn feedback_since(
        &self,
        since: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        let mut records: Vec<FeedbackRecord> = self
            .all_feedback()
            .await?
            .into_iter()
            .filter(|r| r.created_at >= since)
            .filter(|r| user_id.map_or(true, |u| r.user_id == u))
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn all_feedback(&self) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        Ok(db::load_all(self.store.as_ref(), FEEDBACK_COLLECTION).await?)
    }
}

fn since_days(days_back: u32) -> DateTime<Utc> {
    time_window::cutoff(Utc::now(), time_window::days(u64::from(days_back)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDocumentStore;
    use crate::learning::weights::LearningConfig;

    fn aggregator() -> (FeedbackAggregator, Arc<PerformanceTracker>, Arc<AdaptiveWeightController>) {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let controller = Arc::new(AdaptiveWeightController::new(store.clone(), LearningConfig::default()));
        let tracker = Arc::new(PerformanceTracker::new(store.clone()));
        (
            FeedbackAggregator::new(store, controller.clone(), tracker.clone()),
            tracker,
            controller,
        )
    }

    fn submission(user: &str, satisfaction: f64) -> FeedbackSubmission {
        FeedbackSubmission {
            query: "rust ownership".into(),
            user_id: user.into(),
            result_ids: vec!["job_0".into(), "external_rust ownership_0".into()],
            satisfaction,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_validates() {
        let (agg, _, _) = aggregator();
        assert!(matches!(
            agg.submit_feedback(submission("u1", 1.5)).await,
            Err(FeedbackError::Validation(_))
        ));
        assert!(matches!(
            agg.submit_feedback(submission("", 0.5)).await,
            Err(FeedbackError::Validation(_))
        ));
        let ok = agg.submit_feedback(submission("u1", 0.5)).await.unwrap();
        assert_eq!(ok.result_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_patterns_without_feedback() {
        let (agg, _, _) = aggregator();
        let p = agg.analyze_feedback_patterns(7).await.unwrap();
        assert_eq!(p.avg_satisfaction, 0.5);
        assert_eq!(p.common_issues, vec!["No feedback data available yet"]);
    }

    #[tokio::test]
    async fn test_patterns_flag_low_satisfaction() {
        let (agg, _, _) = aggregator();
        for s in [0.2, 0.3, 0.9] {
            agg.submit_feedback(submission("u1", s)).await.unwrap();
        }
        let p = agg.analyze_feedback_patterns(7).await.unwrap();
        assert_eq!(p.total_feedback, 3);
        assert!(p.common_issues.iter().any(|i| i.contains("below optimal")));
        assert!(p.common_issues.iter().any(|i| i.contains("low-satisfaction")));
        assert!(p.improvement_suggestions.iter().any(|i| i.contains("text feedback")));
    }

    #[tokio::test]
    async fn test_system_stats() {
        let (agg, tracker, _) = aggregator();
        let w = FusionWeights::default();
        tracker.record(&PerformanceMetric::new("u1", "a", w, 2, 1, 0.8, 0.5, 100)).await.unwrap();
        tracker.record(&PerformanceMetric::new("u2", "b", w, 1, 1, 0.6, 0.3, 300)).await.unwrap();
        agg.submit_feedback(submission("u1", 0.8)).await.unwrap();

        let stats = agg.get_system_performance_stats(7).await.unwrap();
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.unique_users, 2);
        assert!((stats.avg_confidence - 0.7).abs() < 1e-9);
        assert!((stats.avg_response_time - 200.0).abs() < 1e-9);
        assert!((stats.avg_satisfaction - 0.8).abs() < 1e-9);

        let user = agg.get_user_performance_stats("u1", 7).await.unwrap();
        assert_eq!(user.total_searches, 1);
        assert_eq!(user.quality_distribution.high, 1);
    }

    #[tokio::test]
    async fn test_batch_learning_moves_weights_toward_useful_source() {
        let (agg, _, controller) = aggregator();
        for _ in 0..4 {
            agg.submit_feedback(FeedbackSubmission {
                result_ids: vec!["doc_1".into(), "doc_2".into()],
                ..submission("u1", 0.9)
            })
            .await
            .unwrap();
        }

        let summary = agg.run_batch_learning(Some("u1")).await.unwrap();
        assert_eq!(summary.users_updated, 1);
        let state = controller.get_state("u1").await.unwrap();
        assert!(state.internal_weight > 0.6);
        assert!(state.internal_weight <= 0.6 + 0.05 + 1e-9);
        assert_eq!(state.total_queries, 4);

        // Nothing new to learn the second time
        let again = agg.run_batch_learning(Some("u1")).await.unwrap();
        assert_eq!(again.users_updated, 0);
    }

    #[tokio::test]
    async fn test_unbounded_learning_window_still_learns() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let config = LearningConfig {
            learning_window_hours: u64::MAX,
            ..LearningConfig::default()
        };
        let controller = Arc::new(AdaptiveWeightController::new(store.clone(), config));
        let tracker = Arc::new(PerformanceTracker::new(store.clone()));
        let agg = FeedbackAggregator::new(store, controller.clone(), tracker);
        agg.submit_feedback(FeedbackSubmission {
            result_ids: vec!["doc_1".into()],
            ..submission("u1", 0.9)
        })
        .await
        .unwrap();

        let summary = agg.run_batch_learning(Some("u1")).await.unwrap();
        assert_eq!(summary.users_considered, 1);
        assert_eq!(controller.get_state("u1").await.unwrap().total_queries, 1);
    }

    #[tokio::test]
    async fn test_performance_analysis_finds_optimal_split() {
        let (agg, _, _) = aggregator();
        for (internal, sat) in [(0.8, 0.9), (0.4, 0.3)] {
            for _ in 0..3 {
                agg.submit_feedback(FeedbackSubmission {
                    context: Some(FeedbackContext {
                        weights: Some(FusionWeights::new(internal, 1.0 - internal)),
                        ..Default::default()
                    }),
                    ..submission("u1", sat)
                })
                .await
                .unwrap();
            }
        }

        let analysis = agg.analyze_performance_metrics(Some("u1"), 7).await.unwrap();
        let optimal = analysis.optimal_weights.unwrap();
        assert!((optimal.internal - 0.8).abs() < 1e-9);
        assert!(analysis.recommendations.iter().any(|r| r.contains("best split")));
    }

    #[tokio::test]
    async fn test_self_improvement_report() {
        let (agg, _, _) = aggregator();
        agg.submit_feedback(submission("u1", 0.9)).await.unwrap();
        let report = agg.run_self_improvement(None, 7, true).await.unwrap();
        assert_eq!(report.feedback.total_feedback, 1);
        assert_eq!(report.learning.unwrap().users_considered, 1);
    }
}

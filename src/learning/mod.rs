pub mod feedback;
pub mod performance;
pub mod state;
pub mod weights;

pub use feedback::{
    BatchLearningSummary, FeedbackAggregator, FeedbackContext, FeedbackPatterns, FeedbackRecord,
    FeedbackSubmission, PerformanceAnalysis, SelfImprovementReport, SystemPerformanceStats,
    UserPerformanceStats, FEEDBACK_COLLECTION,
};
pub use performance::{PerformanceMetric, PerformanceTracker, ResultQuality, PERFORMANCE_COLLECTION};
pub use state::{LearningStrategy, MetaLearningState, META_STATE_COLLECTION};
pub use weights::{
    AdaptiveWeightController, AdaptiveWeights, LearningConfig, LearningSample, WeightSource,
    WeightUpdate,
};

use crate::db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("learning state store error: {0}")]
    Store(#[from] StoreError),
    #[error("learning state for {user_id} kept changing after {attempts} attempts")]
    Conflict { user_id: String, attempts: usize },
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("invalid feedback: {0}")]
    Validation(String),
    #[error("feedback store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Learning(#[from] LearningError),
}

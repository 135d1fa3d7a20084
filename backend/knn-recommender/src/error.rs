//! Recommender error types

use crate::services::distance::Metric;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommenderError>;

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("User not found: {0}")]
    UnknownUser(i64),

    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Unknown metric '{0}', expected one of: euclidean, manhattan, cosine, pearson")]
    UnknownMetric(String),

    #[error("Metric not configured: {0}")]
    MetricNotConfigured(Metric),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The ratings matrix advanced but the neighbor indexes did not follow.
    /// Every query fails with this until `rebuild_indexes` succeeds.
    #[error("Index corrupt, reload required: {0}")]
    IndexCorrupt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecommenderError {
    /// Rejected caller input, as opposed to a fatal condition of the core.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RecommenderError::UnknownUser(_)
                | RecommenderError::UnknownColumn(_)
                | RecommenderError::UnknownMetric(_)
                | RecommenderError::MetricNotConfigured(_)
                | RecommenderError::InvalidInput(_)
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RecommenderError::UnknownUser(_) => "unknown_user",
            RecommenderError::UnknownColumn(_) => "unknown_column",
            RecommenderError::UnknownMetric(_) => "unknown_metric",
            RecommenderError::MetricNotConfigured(_) => "metric_not_configured",
            RecommenderError::InvalidInput(_) => "invalid_input",
            RecommenderError::IndexCorrupt(_) => "index_corrupt",
            RecommenderError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(RecommenderError::UnknownUser(7).is_client_error());
        assert!(RecommenderError::MetricNotConfigured(Metric::Pearson).is_client_error());
        assert!(!RecommenderError::IndexCorrupt("fit failed".into()).is_client_error());
        assert!(!RecommenderError::Internal("panic".into()).is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = RecommenderError::MetricNotConfigured(Metric::Pearson);
        assert_eq!(err.to_string(), "Metric not configured: pearson");

        let err = RecommenderError::IndexCorrupt("cosine fit failed".into());
        assert!(err.to_string().contains("reload required"));
        assert_eq!(err.kind(), "index_corrupt");
    }
}

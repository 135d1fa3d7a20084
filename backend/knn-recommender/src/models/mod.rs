use crate::services::distance::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single (user, item, rating) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingObservation {
    pub user_id: i64,
    pub item_id: i64,
    pub rating: f64,
}

/// Neighbor of a dense-table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub neighbor: String,
    pub distance: f64,
}

/// Neighbor of a user row in the sparse index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserNeighbor {
    pub user_id: i64,
    pub distance: f64,
}

/// Read-only catalog reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item_id: i64,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Confidence-adjusted rating (e.g. Bayesian average)
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl CatalogEntry {
    /// Case-insensitive exact tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim();
        self.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(wanted))
    }
}

/// One neighbor's contribution to a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub neighbor_id: i64,
    pub rating: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: i64,
    pub title: String,
    pub tags: Vec<String>,
    pub quality_score: Option<f64>,
    /// Mean neighbor rating; secondary ordering key only
    pub neighbor_average: f64,
    pub contributing_neighbors: Vec<Contribution>,
}

/// Neighbor rating behind a dense-table recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseContribution {
    pub neighbor: String,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseRecommendation {
    pub item: String,
    pub score: f64,
    pub neighbors: Vec<DenseContribution>,
}

/// Result of a user row mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub user_id: i64,
    pub created: bool,
    /// Ratings whose item id is unknown to the item mapper
    pub ignored_items: Vec<i64>,
    pub fit_millis: BTreeMap<Metric, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub num_users: usize,
    pub num_items: usize,
    pub num_ratings: usize,
    pub sparsity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub metric: Metric,
    pub algorithm: String,
    pub fit_millis: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub metrics: Vec<Metric>,
    pub dataset: DatasetInfo,
    pub models: Vec<ModelInfo>,
    pub index_ready: bool,
}

/// In-memory dataset handed over by the external loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(default)]
    pub ratings: Vec<RatingObservation>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

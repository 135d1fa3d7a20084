pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{RecommenderError, Result};
pub use metrics::RecommenderMetrics;
pub use services::{
    compare, recommend_for_column, Catalog, Metric, NeighborIndex, PairwiseRanker, RatingsTable,
    RecommendRequest, RecommendationAggregator, RecommenderService, UpsertRequest,
};

pub mod aggregator;
pub mod catalog;
pub mod distance;
pub mod neighbor_index;
pub mod pairwise;
pub mod recommender;

pub use aggregator::{recommend_for_column, RecommendRequest, RecommendationAggregator};
pub use catalog::Catalog;
pub use distance::Metric;
pub use neighbor_index::{IndexState, NeighborIndex, UpsertRequest};
pub use pairwise::{compare, PairwiseRanker, RatingsTable, TableView};
pub use recommender::RecommenderService;

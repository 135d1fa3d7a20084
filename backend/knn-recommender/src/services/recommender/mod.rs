// ============================================
// Recommender Service (async facade)
// ============================================
//
// Single writer, many readers over the neighbor index. Reads hold an owned
// read guard and writes hold an owned write guard for the whole mutation
// plus rebuild. Distance work runs on the blocking pool.

use crate::config::Config;
use crate::error::{RecommenderError, Result};
use crate::metrics::RecommenderMetrics;
use crate::models::{
    CatalogEntry, DatasetSnapshot, DenseRecommendation, Recommendation, SystemInfo,
    UpsertOutcome, UserNeighbor,
};
use crate::services::aggregator::{
    recommend_for_column, RecommendRequest, RecommendationAggregator,
};
use crate::services::catalog::Catalog;
use crate::services::distance::Metric;
use crate::services::neighbor_index::{NeighborIndex, UpsertRequest};
use crate::services::pairwise::RatingsTable;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct RecommenderService {
    index: Arc<RwLock<NeighborIndex>>,
    catalog: Arc<Catalog>,
    config: Arc<Config>,
    recorder: RecommenderMetrics,
}

impl RecommenderService {
    pub fn new(index: NeighborIndex, catalog: Catalog, config: Config) -> Self {
        Self {
            index: Arc::new(RwLock::new(index)),
            catalog: Arc::new(catalog),
            config: Arc::new(config),
            recorder: RecommenderMetrics::new(),
        }
    }

    /// Build the catalog and neighbor index from an in-memory dataset.
    ///
    /// Catalog items nobody rated still get a matrix column.
    pub fn from_snapshot(snapshot: DatasetSnapshot, config: Config) -> Result<Self> {
        let metrics = config
            .index_metrics()
            .map_err(|e| RecommenderError::InvalidInput(e.to_string()))?;

        let catalog = Catalog::new(snapshot.catalog);
        let index = NeighborIndex::from_observations(catalog.item_ids(), &snapshot.ratings, &metrics)?;

        info!(
            service = %config.service_name,
            catalog_items = catalog.len(),
            ratings = snapshot.ratings.len(),
            "Recommender service ready"
        );

        Ok(Self::new(index, catalog, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Explicit zero is passed through so the index can reject it.
    fn resolve_k(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) => 0,
            other => self.config.clamp_k(other),
        }
    }

    async fn read<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&NeighborIndex) -> Result<T> + Send + 'static,
    {
        let guard = Arc::clone(&self.index).read_owned().await;
        let result = tokio::task::spawn_blocking(move || f(&*guard))
            .await
            .map_err(|e| RecommenderError::Internal(format!("{} task panicked: {}", operation, e)))
            .and_then(|r| r);
        self.observe(operation, result)
    }

    async fn write<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut NeighborIndex) -> Result<T> + Send + 'static,
    {
        let mut guard = Arc::clone(&self.index).write_owned().await;
        let result = tokio::task::spawn_blocking(move || f(&mut *guard))
            .await
            .map_err(|e| RecommenderError::Internal(format!("{} task panicked: {}", operation, e)))
            .and_then(|r| r);
        self.observe(operation, result)
    }

    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.recorder.record_error(e.kind());
            if e.is_client_error() {
                warn!(operation = operation, error = %e, "Request rejected");
            } else {
                error!(operation = operation, error = %e, "Request failed");
            }
        }
        result
    }

    pub async fn neighbors(
        &self,
        user_id: i64,
        metric: Metric,
        k: Option<usize>,
    ) -> Result<Vec<UserNeighbor>> {
        let k = self.resolve_k(k);
        self.read("neighbors", move |index| index.neighbors(user_id, metric, k))
            .await
    }

    pub async fn similar_users(
        &self,
        user_id: i64,
        metric: Metric,
        k: Option<usize>,
    ) -> Result<Vec<UserNeighbor>> {
        let k = self.resolve_k(k);
        self.read("similar_users", move |index| index.similar_users(user_id, metric, k))
            .await
    }

    pub async fn snapshot_row(&self, user_id: i64) -> Result<Vec<f64>> {
        self.read("snapshot_row", move |index| index.snapshot_row(user_id))
            .await
    }

    pub async fn rated_items(&self, user_id: i64) -> Result<Vec<(i64, f64)>> {
        self.read("rated_items", move |index| index.rated_items(user_id))
            .await
    }

    /// Returns once every index reflects the new row.
    pub async fn upsert(
        &self,
        user_id: Option<i64>,
        ratings: HashMap<i64, f64>,
    ) -> Result<UpsertOutcome> {
        self.write("upsert", move |index| index.upsert(user_id, &ratings))
            .await
    }

    pub async fn upsert_batch(&self, requests: Vec<UpsertRequest>) -> Result<Vec<UpsertOutcome>> {
        self.write("upsert_batch", move |index| index.upsert_batch(requests))
            .await
    }

    /// Refit every index; the recovery path after a failed rebuild.
    pub async fn rebuild_indexes(&self) -> Result<BTreeMap<Metric, f64>> {
        let timings = self
            .write("rebuild_indexes", |index| index.rebuild_indexes())
            .await?;
        Ok(timings
            .into_iter()
            .map(|(metric, elapsed)| (metric, elapsed.as_secs_f64() * 1000.0))
            .collect())
    }

    /// `top_k` above the configured maximum is capped.
    pub async fn recommend(&self, mut request: RecommendRequest) -> Result<Vec<Recommendation>> {
        request.top_k = request.top_k.min(self.config.max_k);
        let catalog = Arc::clone(&self.catalog);
        self.read("recommend", move |index| {
            RecommendationAggregator::new(index, &catalog).recommend(&request)
        })
        .await
    }

    /// Request pre-filled with the configured neighbor and result counts.
    pub fn recommend_request(&self, user_id: i64, metric: Metric) -> RecommendRequest {
        RecommendRequest::new(user_id, metric)
            .with_top_k(self.config.default_k)
            .with_top_n(self.config.default_top_n)
    }

    /// Dense-table recommendations for the `target` column, keeping items
    /// whose neighbor average reaches the configured `dense_threshold`.
    pub async fn recommend_for_table(
        &self,
        table: Arc<RatingsTable>,
        target: String,
        metric: Metric,
        k: Option<usize>,
    ) -> Result<Vec<DenseRecommendation>> {
        let k = self.resolve_k(k);
        let threshold = self.config.dense_threshold;
        let result = tokio::task::spawn_blocking(move || {
            recommend_for_column(&table, &target, metric, k, threshold)
        })
        .await
        .map_err(|e| RecommenderError::Internal(format!("recommend_for_table task panicked: {}", e)))
        .and_then(|r| r);
        if result.is_ok() {
            self.recorder.record_query("recommend_for_table", metric.as_str());
        }
        self.observe("recommend_for_table", result)
    }

    pub fn search(
        &self,
        title: Option<&str>,
        category: Option<&str>,
        top_n: Option<usize>,
    ) -> Vec<CatalogEntry> {
        let top_n = top_n.unwrap_or(self.config.default_top_n);
        self.recorder.record_query("search", "none");
        self.catalog.search(title, category, top_n)
    }

    pub async fn info(&self) -> SystemInfo {
        self.index.read().await.info()
    }
}

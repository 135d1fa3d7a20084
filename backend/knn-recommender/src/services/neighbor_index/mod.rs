// ============================================
// Neighbor Index (sparse user-based KNN)
// ============================================
//
// Holds the users x items matrix and one brute-force index per configured
// metric. Every mutation rebuilds all indexes before it returns; a failed
// rebuild leaves the index Corrupt until the next successful rebuild.

mod brute_force;
mod mapper;
mod matrix;

pub use brute_force::BruteForceIndex;
pub use mapper::IdMapper;
pub use matrix::SparseRatingsMatrix;

use crate::error::{RecommenderError, Result};
use crate::metrics::RecommenderMetrics;
use crate::models::{DatasetInfo, ModelInfo, RatingObservation, SystemInfo, UpsertOutcome, UserNeighbor};
use crate::services::distance::Metric;
use sprs::CsMat;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum IndexState {
    Ready,
    /// A rebuild failed; queries are refused until a rebuild succeeds
    Corrupt(String),
}

/// One user-row mutation inside a batch.
#[derive(Debug, Clone, Default)]
pub struct UpsertRequest {
    /// `None` creates a new user
    pub user_id: Option<i64>,
    pub ratings: HashMap<i64, f64>,
}

impl UpsertRequest {
    pub fn new(user_id: Option<i64>, ratings: HashMap<i64, f64>) -> Self {
        Self { user_id, ratings }
    }
}

pub struct NeighborIndex {
    matrix: SparseRatingsMatrix,
    metrics: Vec<Metric>,
    indexes: HashMap<Metric, BruteForceIndex>,
    state: IndexState,
    recorder: RecommenderMetrics,
    #[cfg(test)]
    fail_next_fit: Option<Metric>,
}

impl NeighborIndex {
    /// Build and fit an index for each metric in `metrics`.
    pub fn new(matrix: SparseRatingsMatrix, metrics: &[Metric]) -> Result<Self> {
        if metrics.is_empty() {
            return Err(RecommenderError::InvalidInput(
                "at least one index metric is required".to_string(),
            ));
        }

        let mut unique = Vec::with_capacity(metrics.len());
        for &metric in metrics {
            if !unique.contains(&metric) {
                unique.push(metric);
            }
        }

        let mut index = Self {
            matrix,
            metrics: unique,
            indexes: HashMap::new(),
            state: IndexState::Ready,
            recorder: RecommenderMetrics::new(),
            #[cfg(test)]
            fail_next_fit: None,
        };
        index.rebuild_indexes()?;

        info!(
            users = index.matrix.n_users(),
            items = index.matrix.n_items(),
            ratings = index.matrix.ratings().nnz(),
            metrics = ?index.metrics,
            "Neighbor index initialized"
        );

        Ok(index)
    }

    pub fn from_observations(
        item_ids: impl IntoIterator<Item = i64>,
        observations: &[RatingObservation],
        metrics: &[Metric],
    ) -> Result<Self> {
        let matrix = SparseRatingsMatrix::from_observations(item_ids, observations)?;
        Self::new(matrix, metrics)
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn matrix(&self) -> &SparseRatingsMatrix {
        &self.matrix
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == IndexState::Ready
    }

    fn ensure_ready(&self) -> Result<()> {
        match &self.state {
            IndexState::Ready => Ok(()),
            IndexState::Corrupt(reason) => Err(RecommenderError::IndexCorrupt(reason.clone())),
        }
    }

    /// Nearest `k` users to `user_id` under `metric`, the user included.
    pub fn neighbors(&self, user_id: i64, metric: Metric, k: usize) -> Result<Vec<UserNeighbor>> {
        if k == 0 {
            return Err(RecommenderError::InvalidInput("k must be at least 1".to_string()));
        }
        self.ensure_ready()?;

        let index = self
            .indexes
            .get(&metric)
            .ok_or(RecommenderError::MetricNotConfigured(metric))?;
        let query = self.matrix.dense_row(user_id)?;

        let found = index.kneighbors(&query, k)?;
        self.recorder.record_query("neighbors", metric.as_str());

        let neighbors: Vec<UserNeighbor> = found
            .into_iter()
            .filter_map(|(row, distance)| {
                self.matrix
                    .users()
                    .id(row)
                    .map(|neighbor_id| UserNeighbor {
                        user_id: neighbor_id,
                        distance,
                    })
            })
            .collect();

        debug!(
            user_id = user_id,
            metric = %metric,
            k = k,
            found = neighbors.len(),
            "Neighbor lookup"
        );

        Ok(neighbors)
    }

    /// Like [`neighbors`](Self::neighbors) with the user removed.
    pub fn similar_users(&self, user_id: i64, metric: Metric, k: usize) -> Result<Vec<UserNeighbor>> {
        let mut neighbors = self.neighbors(user_id, metric, k.saturating_add(1))?;
        neighbors.retain(|n| n.user_id != user_id);
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Current dense row of a user, zeros for unrated items.
    pub fn snapshot_row(&self, user_id: i64) -> Result<Vec<f64>> {
        self.matrix.dense_row(user_id)
    }

    /// Stored ratings of a user as (item id, rating), in item ordinal order.
    pub fn rated_items(&self, user_id: i64) -> Result<Vec<(i64, f64)>> {
        Ok(self
            .matrix
            .rated_items(user_id)?
            .into_iter()
            .filter_map(|(col, rating)| self.matrix.items().id(col).map(|id| (id, rating)))
            .collect())
    }

    /// Create (`user_id == None`) or overwrite a user's row, then rebuild.
    ///
    /// Item ids the mapper does not know are skipped and reported.
    pub fn upsert(
        &mut self,
        user_id: Option<i64>,
        ratings: &HashMap<i64, f64>,
    ) -> Result<UpsertOutcome> {
        let mut outcomes = self.upsert_batch(vec![UpsertRequest::new(user_id, ratings.clone())])?;
        outcomes.pop().ok_or_else(|| {
            RecommenderError::Internal("upsert produced no outcome".to_string())
        })
    }

    /// Apply several row mutations, rebuilding the indexes once at the end.
    ///
    /// All requests are validated before any row changes.
    pub fn upsert_batch(&mut self, requests: Vec<UpsertRequest>) -> Result<Vec<UpsertOutcome>> {
        for request in &requests {
            validate_ratings(&request.ratings)?;
            if let Some(user_id) = request.user_id {
                self.matrix.row_of(user_id)?;
            }
        }
        let creates = requests.iter().filter(|r| r.user_id.is_none()).count();
        if creates > 0 {
            let first = self.matrix.users().next_id()?;
            first.checked_add(creates as i64 - 1).ok_or_else(|| {
                RecommenderError::InvalidInput(format!(
                    "not enough user ids for {} new users",
                    creates
                ))
            })?;
        }

        let mut applied = Vec::with_capacity(requests.len());
        for request in &requests {
            let (row, ignored) = self.matrix.build_row(request.ratings.iter());
            if !ignored.is_empty() {
                warn!(
                    user_id = ?request.user_id,
                    ignored = ?ignored,
                    "Ignoring ratings for unknown items"
                );
            }

            let (user_id, created) = match request.user_id {
                Some(user_id) => {
                    self.matrix.overwrite_user(user_id, &row)?;
                    self.recorder.record_upsert("update");
                    (user_id, false)
                }
                None => {
                    let user_id = self.matrix.append_user(&row)?;
                    self.recorder.record_upsert("create");
                    (user_id, true)
                }
            };
            applied.push((user_id, created, ignored));
        }

        let timings = self.rebuild_indexes()?;
        let fit_millis: BTreeMap<Metric, f64> = timings
            .iter()
            .map(|(&metric, elapsed)| (metric, elapsed.as_secs_f64() * 1000.0))
            .collect();

        info!(
            rows = applied.len(),
            users = self.matrix.n_users(),
            "Upserted user rows"
        );

        Ok(applied
            .into_iter()
            .map(|(user_id, created, ignored_items)| UpsertOutcome {
                user_id,
                created,
                ignored_items,
                fit_millis: fit_millis.clone(),
            })
            .collect())
    }

    /// Discard every per-metric index and fit fresh ones from the current matrix.
    ///
    /// On failure the index stays Corrupt; calling this again is the recovery path.
    pub fn rebuild_indexes(&mut self) -> Result<BTreeMap<Metric, Duration>> {
        let started = Instant::now();
        self.indexes.clear();
        self.state = IndexState::Corrupt("rebuild in progress".to_string());

        let snapshot = Arc::new(self.matrix.ratings().clone());
        let mut timings = BTreeMap::new();

        for metric in self.metrics.clone() {
            match self.fit_one(metric, Arc::clone(&snapshot)) {
                Ok(index) => {
                    self.recorder.record_index_fit(metric.as_str(), index.fit_duration());
                    timings.insert(metric, index.fit_duration());
                    self.indexes.insert(metric, index);
                }
                Err(e) => {
                    let reason = format!("{} index fit failed: {}", metric, e);
                    error!(metric = %metric, error = %e, "Index rebuild failed");
                    self.indexes.clear();
                    self.state = IndexState::Corrupt(reason.clone());
                    self.recorder.record_error("index_corrupt");
                    return Err(RecommenderError::IndexCorrupt(reason));
                }
            }
        }

        self.state = IndexState::Ready;
        debug!(
            metrics = self.metrics.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Indexes rebuilt"
        );

        Ok(timings)
    }

    fn fit_one(&mut self, metric: Metric, snapshot: Arc<CsMat<f64>>) -> Result<BruteForceIndex> {
        #[cfg(test)]
        if self.fail_next_fit == Some(metric) {
            self.fail_next_fit = None;
            return Err(RecommenderError::Internal("injected fit failure".to_string()));
        }

        BruteForceIndex::fit(metric, snapshot)
    }

    #[cfg(test)]
    pub(crate) fn fail_next_fit(&mut self, metric: Metric) {
        self.fail_next_fit = Some(metric);
    }

    pub fn info(&self) -> SystemInfo {
        let num_users = self.matrix.n_users();
        let num_items = self.matrix.n_items();
        let num_ratings = self.matrix.ratings().nnz();
        let sparsity = if self.matrix.users().is_empty() || self.matrix.items().is_empty() {
            0.0
        } else {
            1.0 - num_ratings as f64 / (num_users * num_items) as f64
        };

        let models = self
            .metrics
            .iter()
            .map(|&metric| ModelInfo {
                metric,
                algorithm: "brute".to_string(),
                fit_millis: self
                    .indexes
                    .get(&metric)
                    .map(|index| index.fit_duration().as_secs_f64() * 1000.0)
                    .unwrap_or(0.0),
            })
            .collect();

        SystemInfo {
            metrics: self.metrics.clone(),
            dataset: DatasetInfo {
                num_users,
                num_items,
                num_ratings,
                sparsity,
            },
            models,
            index_ready: self.is_ready(),
        }
    }
}

fn validate_ratings(ratings: &HashMap<i64, f64>) -> Result<()> {
    if let Some((item_id, rating)) = ratings.iter().find(|(_, r)| !r.is_finite()) {
        return Err(RecommenderError::InvalidInput(format!(
            "rating {} for item {} is not finite",
            rating, item_id
        )));
    }
    Ok(())
}

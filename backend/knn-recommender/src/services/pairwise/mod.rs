//! Pairwise ranking over a dense ratings table.
//!
//! Every column other than the target is compared to the target column with
//! the configured metric. Results are ordered by ascending distance; equal
//! distances keep the table's column order.

mod table;

pub use table::{RatingsTable, TableView};

use crate::error::{RecommenderError, Result};
use crate::models::NeighborResult;
use crate::services::distance::{round_to, valid_pair_count, Metric};
use tracing::debug;

/// Decimal places kept on reported distances.
const DISTANCE_DECIMALS: i32 = 4;

pub struct PairwiseRanker {
    metric: Metric,
}

impl PairwiseRanker {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Distance from `target` to every other column, ascending, including
    /// columns with no overlapping ratings (reported as `+inf`).
    pub fn distances(&self, table: &RatingsTable, target: &str) -> Result<Vec<NeighborResult>> {
        let target_pos = table.require_column(target)?;
        let target_values = table.column_values(target_pos);

        let mut scored: Vec<(usize, f64)> = Vec::with_capacity(table.n_columns());
        for position in 0..table.n_columns() {
            if position == target_pos {
                continue;
            }

            let other = table.column_values(position);
            let distance = if valid_pair_count(&target_values, &other) == 0 {
                f64::INFINITY
            } else {
                self.metric.distance(&target_values, &other)
            };
            scored.push((position, distance));
        }

        // Stable: ties keep column order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .map(|(position, distance)| NeighborResult {
                neighbor: table.columns()[position].clone(),
                distance,
            })
            .collect())
    }

    /// The `k` closest columns with a usable distance.
    ///
    /// Columns without signal are dropped; fewer than `k` valid neighbors
    /// returns what there is.
    pub fn rank_neighbors(
        &self,
        table: &RatingsTable,
        target: &str,
        k: usize,
    ) -> Result<Vec<NeighborResult>> {
        if k == 0 {
            return Err(RecommenderError::InvalidInput(
                "k must be positive".to_string(),
            ));
        }

        let neighbors: Vec<NeighborResult> = self
            .distances(table, target)?
            .into_iter()
            .filter(|n| n.distance.is_finite())
            .take(k)
            .map(|n| NeighborResult {
                distance: round_to(n.distance, DISTANCE_DECIMALS),
                ..n
            })
            .collect();

        debug!(
            target = %target,
            metric = %self.metric,
            k = k,
            found = neighbors.len(),
            "Pairwise neighbors ranked"
        );

        Ok(neighbors)
    }
}

/// Native metric value between two columns: distance for Euclidean and
/// Manhattan, similarity for Cosine and Pearson. No overlapping ratings
/// yields `+inf`.
pub fn compare(table: &RatingsTable, user_a: &str, user_b: &str, metric: Metric) -> Result<f64> {
    let a = table.column_values(table.require_column(user_a)?);
    let b = table.column_values(table.require_column(user_b)?);

    if valid_pair_count(&a, &b) == 0 {
        return Ok(f64::INFINITY);
    }
    Ok(round_to(metric.native_value(&a, &b), DISTANCE_DECIMALS))
}

use super::matrix::{fill_dense, first_non_finite};
use crate::error::{RecommenderError, Result};
use crate::services::distance::Metric;
use sprs::CsMat;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exhaustive nearest-neighbor search over one matrix snapshot.
///
/// Unset cells are zeros here, not missing values.
pub struct BruteForceIndex {
    metric: Metric,
    snapshot: Arc<CsMat<f64>>,
    /// Per-row squared L2 norms, only filled for cosine
    sq_norms: Vec<f64>,
    fit_duration: Duration,
}

impl BruteForceIndex {
    pub fn fit(metric: Metric, snapshot: Arc<CsMat<f64>>) -> Result<Self> {
        let started = Instant::now();

        if let Some((row, col)) = first_non_finite(&snapshot) {
            return Err(RecommenderError::IndexCorrupt(format!(
                "non-finite value at row {} column {}",
                row, col
            )));
        }

        let sq_norms = match metric {
            Metric::Cosine => snapshot
                .outer_iterator()
                .map(|row| row.iter().map(|(_, v)| v * v).sum::<f64>())
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            metric,
            snapshot,
            sq_norms,
            fit_duration: started.elapsed(),
        })
    }

    pub fn fit_duration(&self) -> Duration {
        self.fit_duration
    }

    /// The `k` rows closest to `query` as (row ordinal, distance), ascending
    /// by distance, ties in row order.
    pub fn kneighbors(&self, query: &[f64], k: usize) -> Result<Vec<(usize, f64)>> {
        if query.len() != self.snapshot.cols() {
            return Err(RecommenderError::InvalidInput(format!(
                "query has {} columns, index has {}",
                query.len(),
                self.snapshot.cols()
            )));
        }

        let mut scored: Vec<(usize, f64)> = match self.metric {
            Metric::Cosine => self.cosine_scan(query),
            metric => {
                let mut buf = vec![0.0; self.snapshot.cols()];
                self.snapshot
                    .outer_iterator()
                    .enumerate()
                    .map(|(row, vec)| {
                        fill_dense(vec, &mut buf);
                        (row, metric.distance(query, &buf))
                    })
                    .collect()
            }
        };

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }

    fn cosine_scan(&self, query: &[f64]) -> Vec<(usize, f64)> {
        if query.is_empty() {
            return (0..self.snapshot.rows())
                .map(|row| (row, f64::INFINITY))
                .collect();
        }

        let query_sq: f64 = query.iter().map(|v| v * v).sum();
        self.snapshot
            .outer_iterator()
            .enumerate()
            .map(|(row, vec)| {
                let row_sq = self.sq_norms[row];
                if query_sq == 0.0 || row_sq == 0.0 {
                    return (row, 1.0);
                }
                let dot: f64 = vec.iter().map(|(c, &v)| query[c] * v).sum();
                // sqrt of the product keeps identical rows at exactly zero
                let similarity = (dot / (query_sq * row_sq).sqrt()).clamp(-1.0, 1.0);
                (row, (1.0 - similarity).max(0.0))
            })
            .collect()
    }
}

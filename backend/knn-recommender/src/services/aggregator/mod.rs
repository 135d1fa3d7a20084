// ============================================
// Recommendation Aggregator
// ============================================
//
// Turns a user's nearest neighbors into ranked, explainable item
// suggestions. Ranking is by catalog quality score first; the neighbor
// rating average only breaks ties.

mod dense;

pub use dense::recommend_for_column;

use crate::error::{RecommenderError, Result};
use crate::models::{Contribution, Recommendation};
use crate::services::catalog::{by_quality_desc, Catalog};
use crate::services::distance::{round_to, Metric};
use crate::services::neighbor_index::NeighborIndex;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendRequest {
    pub user_id: i64,
    pub metric: Metric,
    pub top_k: usize,
    pub top_n: usize,
    pub category: Option<String>,
}

impl RecommendRequest {
    pub fn new(user_id: i64, metric: Metric) -> Self {
        Self {
            user_id,
            metric,
            top_k: 5,
            top_n: 10,
            category: None,
        }
    }

    /// Number of neighbors to aggregate over
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Number of recommendations to return
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Only recommend items carrying this tag
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

struct Candidate {
    ordinal: usize,
    item_id: i64,
    average: f64,
    contributions: Vec<Contribution>,
}

pub struct RecommendationAggregator<'a> {
    index: &'a NeighborIndex,
    catalog: &'a Catalog,
}

impl<'a> RecommendationAggregator<'a> {
    pub fn new(index: &'a NeighborIndex, catalog: &'a Catalog) -> Self {
        Self { index, catalog }
    }

    /// Items the user has not rated, liked by their nearest neighbors.
    ///
    /// Items without a catalog entry are never returned.
    pub fn recommend(&self, request: &RecommendRequest) -> Result<Vec<Recommendation>> {
        if request.top_k == 0 {
            return Err(RecommenderError::InvalidInput(
                "top_k must be at least 1".to_string(),
            ));
        }

        // One extra neighbor stands in for the user itself. When the user is
        // not among the results, all top_k + 1 neighbors are aggregated.
        let mut neighbors = self.index.neighbors(
            request.user_id,
            request.metric,
            request.top_k.saturating_add(1),
        )?;
        neighbors.retain(|n| n.user_id != request.user_id);

        let matrix = self.index.matrix();
        let seen: HashSet<usize> = matrix
            .rated_items(request.user_id)?
            .into_iter()
            .filter(|(_, rating)| *rating != 0.0)
            .map(|(col, _)| col)
            .collect();

        let category = request
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let mut grouped: BTreeMap<usize, Vec<Contribution>> = BTreeMap::new();
        for neighbor in &neighbors {
            for (col, rating) in matrix.rated_items(neighbor.user_id)? {
                if rating <= 0.0 || seen.contains(&col) {
                    continue;
                }
                if let Some(tag) = category {
                    let tagged = matrix
                        .items()
                        .id(col)
                        .and_then(|item_id| self.catalog.get(item_id))
                        .map_or(false, |entry| entry.has_tag(tag));
                    if !tagged {
                        continue;
                    }
                }
                grouped.entry(col).or_default().push(Contribution {
                    neighbor_id: neighbor.user_id,
                    rating,
                    distance: neighbor.distance,
                });
            }
        }

        let mut candidates: Vec<Candidate> = grouped
            .into_iter()
            .filter_map(|(ordinal, contributions)| {
                let item_id = matrix.items().id(ordinal)?;
                let sum: f64 = contributions.iter().map(|c| c.rating).sum();
                Some(Candidate {
                    ordinal,
                    item_id,
                    average: sum / contributions.len() as f64,
                    contributions,
                })
            })
            .filter(|c| self.catalog.get(c.item_id).is_some())
            .collect();

        candidates.sort_by(|a, b| {
            let quality_a = self.catalog.get(a.item_id).and_then(|e| e.quality_score);
            let quality_b = self.catalog.get(b.item_id).and_then(|e| e.quality_score);
            by_quality_desc(quality_a, quality_b)
                .then_with(|| b.average.total_cmp(&a.average))
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        candidates.truncate(request.top_n);

        let recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let entry = self.catalog.get(candidate.item_id)?;
                Some(Recommendation {
                    item_id: candidate.item_id,
                    title: entry.title.clone(),
                    tags: entry.tags.clone(),
                    quality_score: entry.quality_score,
                    neighbor_average: round_to(candidate.average, 4),
                    contributing_neighbors: candidate.contributions,
                })
            })
            .collect();

        debug!(
            user_id = request.user_id,
            metric = %request.metric,
            neighbors = neighbors.len(),
            seen = seen.len(),
            category = ?category,
            results = recommendations.len(),
            "Recommendations aggregated"
        );

        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, RatingObservation};
    use std::collections::HashMap;

    fn obs(user_id: i64, item_id: i64, rating: f64) -> RatingObservation {
        RatingObservation {
            user_id,
            item_id,
            rating,
        }
    }

    fn entry(item_id: i64, tags: &[&str], quality: Option<f64>) -> CatalogEntry {
        CatalogEntry {
            item_id,
            title: format!("Item {}", item_id),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            quality_score: quality,
        }
    }

    /// Target user 0 rated items 1 and 2. Users 1 and 2 agree on those and
    /// additionally rated 3, 4 and 5; user 3 shares nothing with user 0.
    fn fixture() -> (NeighborIndex, Catalog) {
        let observations = vec![
            obs(0, 1, 5.0),
            obs(0, 2, 4.0),
            obs(1, 1, 5.0),
            obs(1, 2, 4.0),
            obs(1, 3, 5.0),
            obs(1, 4, 2.0),
            obs(2, 1, 4.0),
            obs(2, 2, 4.0),
            obs(2, 3, 3.0),
            obs(2, 5, 4.5),
            obs(3, 6, 5.0),
        ];
        let catalog = Catalog::new(vec![
            entry(1, &["Drama"], Some(4.0)),
            entry(2, &["Drama"], Some(3.5)),
            entry(3, &["Comedy"], Some(3.0)),
            entry(4, &["Drama"], Some(4.2)),
            entry(5, &["Comedy", "Drama"], None),
            entry(6, &["Horror"], Some(4.9)),
        ]);
        let index = NeighborIndex::from_observations(
            catalog.item_ids(),
            &observations,
            &[Metric::Euclidean, Metric::Cosine],
        )
        .unwrap();
        (index, catalog)
    }

    #[test]
    fn test_never_recommends_seen_items() {
        let (index, catalog) = fixture();
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(&RecommendRequest::new(0, Metric::Euclidean).with_top_k(3))
            .unwrap();

        assert!(!recs.is_empty());
        assert!(recs.iter().all(|r| r.item_id != 1 && r.item_id != 2));
    }

    #[test]
    fn test_ranked_by_quality_not_neighbor_average() {
        let (index, catalog) = fixture();
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(&RecommendRequest::new(0, Metric::Euclidean).with_top_k(2))
            .unwrap();

        let ids: Vec<i64> = recs.iter().map(|r| r.item_id).collect();
        // Item 4 has the lowest neighbor average (2.0) but the best quality
        assert_eq!(ids, vec![4, 3, 5]);
        assert!((recs[0].neighbor_average - 2.0).abs() < 1e-6);
        assert!((recs[1].neighbor_average - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_contributions_explain_each_item() {
        let (index, catalog) = fixture();
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(&RecommendRequest::new(0, Metric::Euclidean).with_top_k(2))
            .unwrap();

        let item3 = recs.iter().find(|r| r.item_id == 3).unwrap();
        let contributors: Vec<i64> = item3
            .contributing_neighbors
            .iter()
            .map(|c| c.neighbor_id)
            .collect();
        // Neighbor order: user 1 is closer to user 0 than user 2
        assert_eq!(contributors, vec![1, 2]);
        assert_eq!(item3.contributing_neighbors[0].rating, 5.0);
        assert!(item3.contributing_neighbors[0].distance < item3.contributing_neighbors[1].distance);
    }

    #[test]
    fn test_category_filter() {
        let (index, catalog) = fixture();
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(
                &RecommendRequest::new(0, Metric::Euclidean)
                    .with_top_k(2)
                    .with_category("comedy"),
            )
            .unwrap();

        let ids: Vec<i64> = recs.iter().map(|r| r.item_id).collect();
        assert_eq!(ids, vec![3, 5]);

        let none = aggregator
            .recommend(
                &RecommendRequest::new(0, Metric::Euclidean)
                    .with_top_k(2)
                    .with_category("Western"),
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_top_n_truncates() {
        let (index, catalog) = fixture();
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(
                &RecommendRequest::new(0, Metric::Cosine)
                    .with_top_k(3)
                    .with_top_n(1),
            )
            .unwrap();
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_nan_quality_ranks_with_unscored_items() {
        let (index, _) = fixture();
        let catalog = Catalog::new(vec![
            entry(1, &["Drama"], Some(4.0)),
            entry(2, &["Drama"], Some(3.5)),
            entry(3, &["Comedy"], Some(3.0)),
            entry(4, &["Drama"], Some(f64::NAN)),
            entry(5, &["Comedy", "Drama"], None),
            entry(6, &["Horror"], Some(4.9)),
        ]);
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(&RecommendRequest::new(0, Metric::Euclidean).with_top_k(2))
            .unwrap();

        let ids: Vec<i64> = recs.iter().map(|r| r.item_id).collect();
        // Items 4 and 5 are both unscored; the higher neighbor average wins
        assert_eq!(ids, vec![3, 5, 4]);
        assert_eq!(recs[2].quality_score, None);
    }

    #[test]
    fn test_keeps_extra_neighbor_when_user_not_returned() {
        let (mut index, catalog) = fixture();
        // An all-zero row is equally far from everyone under cosine, so
        // row order decides and the new last row is not among the first three
        let outcome = index.upsert(None, &HashMap::new()).unwrap();
        let found = index.neighbors(outcome.user_id, Metric::Cosine, 3).unwrap();
        assert!(found.iter().all(|n| n.user_id != outcome.user_id));

        let aggregator = RecommendationAggregator::new(&index, &catalog);
        let recs = aggregator
            .recommend(
                &RecommendRequest::new(outcome.user_id, Metric::Cosine)
                    .with_top_k(2)
                    .with_top_n(20),
            )
            .unwrap();

        let contributors: HashSet<i64> = recs
            .iter()
            .flat_map(|r| r.contributing_neighbors.iter().map(|c| c.neighbor_id))
            .collect();
        assert_eq!(contributors, HashSet::from([0, 1, 2]));
    }

    #[test]
    fn test_errors() {
        let (index, catalog) = fixture();
        let aggregator = RecommendationAggregator::new(&index, &catalog);
        assert!(matches!(
            aggregator.recommend(&RecommendRequest::new(42, Metric::Cosine)),
            Err(RecommenderError::UnknownUser(42))
        ));
        assert!(matches!(
            aggregator.recommend(&RecommendRequest::new(0, Metric::Manhattan)),
            Err(RecommenderError::MetricNotConfigured(Metric::Manhattan))
        ));
        assert!(matches!(
            aggregator.recommend(&RecommendRequest::new(0, Metric::Cosine).with_top_k(0)),
            Err(RecommenderError::InvalidInput(_))
        ));
    }
}

use crate::error::Result;
use crate::models::{DenseContribution, DenseRecommendation};
use crate::services::distance::{round_to, Metric};
use crate::services::pairwise::{PairwiseRanker, RatingsTable};
use tracing::debug;

const SCORE_DECIMALS: i32 = 3;

/// Recommend unrated items of `target` whose average rating among its `k`
/// nearest columns is at least `threshold`.
///
/// Neighbors that did not rate an item do not count toward its average.
/// Results are ordered by score descending, ties in item order.
pub fn recommend_for_column(
    table: &RatingsTable,
    target: &str,
    metric: Metric,
    k: usize,
    threshold: f64,
) -> Result<Vec<DenseRecommendation>> {
    let target_pos = table.require_column(target)?;
    let neighbors = PairwiseRanker::new(metric).rank_neighbors(table, target, k)?;

    let neighbor_positions: Vec<(&str, usize)> = neighbors
        .iter()
        .filter_map(|n| {
            table
                .column_position(&n.neighbor)
                .map(|pos| (n.neighbor.as_str(), pos))
        })
        .collect();

    let mut recommendations = Vec::new();
    for (item_pos, item) in table.items().iter().enumerate() {
        if table.cell(item_pos, target_pos).is_some() {
            continue;
        }

        let mut rated: Vec<DenseContribution> = neighbor_positions
            .iter()
            .filter_map(|&(name, pos)| {
                table.cell(item_pos, pos).map(|rating| DenseContribution {
                    neighbor: name.to_string(),
                    rating,
                })
            })
            .collect();
        if rated.is_empty() {
            continue;
        }

        let average = rated.iter().map(|c| c.rating).sum::<f64>() / rated.len() as f64;
        if average < threshold {
            continue;
        }

        rated.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        for contribution in &mut rated {
            contribution.rating = round_to(contribution.rating, SCORE_DECIMALS);
        }

        recommendations.push(DenseRecommendation {
            item: item.clone(),
            score: round_to(average, SCORE_DECIMALS),
            neighbors: rated,
        });
    }

    recommendations.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        target = %target,
        metric = %metric,
        neighbors = neighbor_positions.len(),
        results = recommendations.len(),
        "Dense recommendations computed"
    );

    Ok(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommenderError;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Target T has rated I1 and I2 only.
    fn table() -> RatingsTable {
        RatingsTable::new(
            labels(&["I1", "I2", "I3", "I4", "I5"]),
            labels(&["T", "N1", "N2", "FAR"]),
            vec![
                vec![Some(5.0), Some(5.0), Some(4.0), Some(1.0)],
                vec![Some(3.0), Some(3.0), Some(3.0), Some(5.0)],
                vec![None, Some(4.0), Some(3.5), Some(1.0)],
                vec![None, Some(2.0), Some(3.0), Some(5.0)],
                vec![None, None, Some(4.5), None],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_recommends_unrated_items_above_threshold() {
        let recs = recommend_for_column(&table(), "T", Metric::Euclidean, 2, 3.5).unwrap();

        let items: Vec<&str> = recs.iter().map(|r| r.item.as_str()).collect();
        // I4 averages 2.5 over N1 and N2
        assert_eq!(items, vec!["I5", "I3"]);
        assert!((recs[0].score - 4.5).abs() < 1e-6);
        assert!((recs[1].score - 3.75).abs() < 1e-6);
    }

    #[test]
    fn test_neighbors_sorted_by_rating() {
        let recs = recommend_for_column(&table(), "T", Metric::Euclidean, 2, 0.0).unwrap();
        let i3 = recs.iter().find(|r| r.item == "I3").unwrap();
        let names: Vec<&str> = i3.neighbors.iter().map(|n| n.neighbor.as_str()).collect();
        assert_eq!(names, vec!["N1", "N2"]);

        // Only N2 rated I5
        let i5 = recs.iter().find(|r| r.item == "I5").unwrap();
        assert_eq!(i5.neighbors.len(), 1);
        assert_eq!(i5.neighbors[0].neighbor, "N2");
    }

    #[test]
    fn test_scores_are_rounded() {
        let t = RatingsTable::new(
            labels(&["I1", "I2"]),
            labels(&["T", "A", "B", "C"]),
            vec![
                vec![Some(4.0), Some(4.0), Some(4.0), Some(4.0)],
                vec![None, Some(4.0), Some(4.0), Some(5.0)],
            ],
        )
        .unwrap();
        let recs = recommend_for_column(&t, "T", Metric::Manhattan, 3, 3.5).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].score, 4.333);
    }

    #[test]
    fn test_unknown_target() {
        assert!(matches!(
            recommend_for_column(&table(), "nobody", Metric::Cosine, 2, 3.5),
            Err(RecommenderError::UnknownColumn(_))
        ));
    }
}

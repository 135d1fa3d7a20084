use crate::models::CatalogEntry;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Read-only item metadata keyed by item id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<i64, usize>,
}

impl Catalog {
    /// Later entries with a repeated item id replace earlier ones.
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut kept: Vec<CatalogEntry> = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());

        for mut entry in entries {
            // A non-finite score carries no ranking signal
            entry.quality_score = entry.quality_score.filter(|q| q.is_finite());
            match by_id.get(&entry.item_id) {
                Some(&pos) => kept[pos] = entry,
                None => {
                    by_id.insert(entry.item_id, kept.len());
                    kept.push(entry);
                }
            }
        }

        Self {
            entries: kept,
            by_id,
        }
    }

    pub fn get(&self, item_id: i64) -> Option<&CatalogEntry> {
        self.by_id.get(&item_id).map(|&pos| &self.entries[pos])
    }

    pub fn item_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.iter().map(|e| e.item_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries matching a case-insensitive title substring and/or an exact
    /// case-insensitive tag, best quality score first.
    ///
    /// Both filters must match when both are given. With neither filter the
    /// result is empty.
    pub fn search(
        &self,
        title: Option<&str>,
        category: Option<&str>,
        top_n: usize,
    ) -> Vec<CatalogEntry> {
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        let category = category.map(str::trim).filter(|c| !c.is_empty());

        if title.is_none() && category.is_none() {
            warn!("Catalog search called without a title or category filter");
            return Vec::new();
        }

        let needle = title.map(str::to_lowercase);
        let mut matches: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|entry| match &needle {
                Some(needle) => entry.title.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .filter(|entry| category.map_or(true, |c| entry.has_tag(c)))
            .collect();

        matches.sort_by(|a, b| by_quality_desc(a.quality_score, b.quality_score));
        matches.truncate(top_n);

        debug!(
            title = ?title,
            category = ?category,
            results = matches.len(),
            "Catalog search"
        );

        matches.into_iter().cloned().collect()
    }
}

/// Descending quality order with missing or non-finite scores last.
pub fn by_quality_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a.filter(|q| q.is_finite()), b.filter(|q| q.is_finite())) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(item_id: i64, title: &str, tags: &[&str], quality: Option<f64>) -> CatalogEntry {
        CatalogEntry {
            item_id,
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            quality_score: quality,
        }
    }

    fn sample() -> Catalog {
        Catalog::new(vec![
            entry(1, "Toy Story (1995)", &["Animation", "Comedy"], Some(3.9)),
            entry(2, "Jumanji (1995)", &["Adventure", "Fantasy"], Some(3.2)),
            entry(3, "Toy Story 2 (1999)", &["Animation"], None),
            entry(4, "Heat (1995)", &["Action", "Crime"], Some(3.8)),
            entry(5, "Toy Soldiers (1991)", &["Action"], Some(3.1)),
        ])
    }

    #[test]
    fn test_title_search_case_insensitive() {
        let results = sample().search(Some("toy s"), None, 10);
        let ids: Vec<i64> = results.iter().map(|e| e.item_id).collect();
        // Missing quality sorts last
        assert_eq!(ids, vec![1, 5, 3]);
    }

    #[test]
    fn test_category_search_exact_tag() {
        let catalog = sample();
        let ids: Vec<i64> = catalog
            .search(None, Some("action"), 10)
            .iter()
            .map(|e| e.item_id)
            .collect();
        assert_eq!(ids, vec![4, 5]);
        assert!(catalog.search(None, Some("Act"), 10).is_empty());
    }

    #[test]
    fn test_both_filters_must_match() {
        let ids: Vec<i64> = sample()
            .search(Some("toy"), Some("Action"), 10)
            .iter()
            .map(|e| e.item_id)
            .collect();
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn test_no_filter_is_empty() {
        assert!(sample().search(None, None, 10).is_empty());
        assert!(sample().search(Some("  "), None, 10).is_empty());
    }

    #[test]
    fn test_truncates_to_top_n() {
        assert_eq!(sample().search(Some("19"), None, 2).len(), 2);
    }

    #[test]
    fn test_duplicate_ids_keep_last() {
        let catalog = Catalog::new(vec![
            entry(1, "Old", &[], None),
            entry(1, "New", &[], Some(1.0)),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(1).map(|e| e.title.as_str()), Some("New"));
        assert!(catalog.get(2).is_none());
    }

    #[test]
    fn test_nan_quality_sorts_as_missing() {
        let qualities = [3.0, f64::NAN, 4.0, 1.0, f64::NAN, 5.0, 2.0, 4.5, f64::NAN, 0.5, 3.5, 2.5];
        let catalog = Catalog::new(
            qualities
                .iter()
                .enumerate()
                .map(|(i, &q)| entry(i as i64, &format!("Film {}", i), &["Drama"], Some(q)))
                .collect(),
        );

        let results = catalog.search(None, Some("Drama"), 20);
        let scores: Vec<Option<f64>> = results.iter().map(|e| e.quality_score).collect();
        assert_eq!(
            scores,
            vec![
                Some(5.0),
                Some(4.5),
                Some(4.0),
                Some(3.5),
                Some(3.0),
                Some(2.5),
                Some(2.0),
                Some(1.0),
                Some(0.5),
                None,
                None,
                None,
            ]
        );
        // Unscored entries keep catalog order
        let tail: Vec<i64> = results[9..].iter().map(|e| e.item_id).collect();
        assert_eq!(tail, vec![1, 4, 8]);
    }

    #[test]
    fn test_quality_ordering_with_nan() {
        let mut scores = vec![Some(2.0), Some(f64::NAN), None, Some(7.0), Some(f64::INFINITY)];
        scores.sort_by(|a, b| by_quality_desc(*a, *b));
        assert_eq!(scores[0], Some(7.0));
        assert_eq!(scores[1], Some(2.0));
        assert!(scores[2..].iter().all(|q| q.map_or(true, |q| !q.is_finite())));
    }

    #[test]
    fn test_quality_ordering() {
        assert_eq!(by_quality_desc(Some(4.0), Some(3.0)), Ordering::Less);
        assert_eq!(by_quality_desc(None, Some(0.0)), Ordering::Greater);
        assert_eq!(by_quality_desc(None, None), Ordering::Equal);
    }
}

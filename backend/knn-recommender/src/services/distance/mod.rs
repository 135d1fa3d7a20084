// ============================================
// Distance Metrics
// ============================================
//
// Pairwise distance / similarity between two rating vectors.
//
// A position is missing when it holds NaN. Every metric first reduces the
// inputs to the positions where BOTH vectors are present; a missing value is
// never read as zero.
//
// Neutral values when there is not enough signal:
//   - Euclidean / Manhattan / Cosine distance, no valid pairs: +inf
//   - Cosine similarity, no valid pairs or a zero norm: 0 (distance 1)
//   - Pearson correlation, < 2 valid pairs or zero variance: 0 (distance 1)

use crate::error::RecommenderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of metrics understood by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    Manhattan,
    Cosine,
    Pearson,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Euclidean,
        Metric::Manhattan,
        Metric::Cosine,
        Metric::Pearson,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Cosine => "cosine",
            Metric::Pearson => "pearson",
        }
    }

    /// Distance between `u` and `v`; smaller is closer.
    pub fn distance(&self, u: &[f64], v: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => euclidean_distance(u, v),
            Metric::Manhattan => manhattan_distance(u, v),
            Metric::Cosine => cosine_distance(u, v),
            Metric::Pearson => pearson_distance(u, v),
        }
    }

    /// Raw similarity for the metrics that have one.
    pub fn similarity(&self, u: &[f64], v: &[f64]) -> Option<f64> {
        match self {
            Metric::Cosine => Some(cosine_similarity(u, v)),
            Metric::Pearson => Some(pearson_correlation(u, v)),
            Metric::Euclidean | Metric::Manhattan => None,
        }
    }

    /// Native value of the metric: similarity for Cosine/Pearson, distance otherwise.
    pub fn native_value(&self, u: &[f64], v: &[f64]) -> f64 {
        self.similarity(u, v)
            .unwrap_or_else(|| self.distance(u, v))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RecommenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Metric::Euclidean),
            "manhattan" => Ok(Metric::Manhattan),
            "cosine" => Ok(Metric::Cosine),
            "pearson" => Ok(Metric::Pearson),
            _ => Err(RecommenderError::UnknownMetric(s.to_string())),
        }
    }
}

#[inline]
fn is_present(x: f64) -> bool {
    !x.is_nan()
}

/// Positions where both inputs are present.
pub fn valid_pairs<'a>(u: &'a [f64], v: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    u.iter()
        .zip(v.iter())
        .filter(|(a, b)| is_present(**a) && is_present(**b))
        .map(|(a, b)| (*a, *b))
}

/// Number of positions where both inputs are present.
pub fn valid_pair_count(u: &[f64], v: &[f64]) -> usize {
    valid_pairs(u, v).count()
}

pub fn euclidean_distance(u: &[f64], v: &[f64]) -> f64 {
    let mut pairs = 0usize;
    let mut sum_sq = 0.0;
    for (a, b) in valid_pairs(u, v) {
        let diff = a - b;
        sum_sq += diff * diff;
        pairs += 1;
    }

    if pairs == 0 {
        return f64::INFINITY;
    }
    sum_sq.sqrt()
}

pub fn manhattan_distance(u: &[f64], v: &[f64]) -> f64 {
    let mut pairs = 0usize;
    let mut sum = 0.0;
    for (a, b) in valid_pairs(u, v) {
        sum += (a - b).abs();
        pairs += 1;
    }

    if pairs == 0 {
        return f64::INFINITY;
    }
    sum
}

pub fn cosine_similarity(u: &[f64], v: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_u = 0.0;
    let mut norm_v = 0.0;
    for (a, b) in valid_pairs(u, v) {
        dot += a * b;
        norm_u += a * a;
        norm_v += b * b;
    }

    if norm_u == 0.0 || norm_v == 0.0 {
        return 0.0;
    }
    (dot / (norm_u.sqrt() * norm_v.sqrt())).clamp(-1.0, 1.0)
}

pub fn cosine_distance(u: &[f64], v: &[f64]) -> f64 {
    if valid_pair_count(u, v) == 0 {
        return f64::INFINITY;
    }
    1.0 - cosine_similarity(u, v)
}

/// Two-pass Pearson correlation (means first, then centred sums).
pub fn pearson_correlation(u: &[f64], v: &[f64]) -> f64 {
    let (mut n, mut sum_u, mut sum_v) = (0usize, 0.0, 0.0);
    for (a, b) in valid_pairs(u, v) {
        n += 1;
        sum_u += a;
        sum_v += b;
    }
    if n < 2 {
        return 0.0;
    }

    let mean_u = sum_u / n as f64;
    let mean_v = sum_v / n as f64;

    let (mut cov, mut var_u, mut var_v) = (0.0, 0.0, 0.0);
    for (a, b) in valid_pairs(u, v) {
        let du = a - mean_u;
        let dv = b - mean_v;
        cov += du * dv;
        var_u += du * du;
        var_v += dv * dv;
    }

    if var_u == 0.0 || var_v == 0.0 {
        return 0.0;
    }
    (cov / (var_u.sqrt() * var_v.sqrt())).clamp(-1.0, 1.0)
}

pub fn pearson_distance(u: &[f64], v: &[f64]) -> f64 {
    1.0 - pearson_correlation(u, v)
}

/// Round to `places` decimals, leaving non-finite values untouched.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

use crate::services::distance::Metric;
use serde::Deserialize;
use thiserror::Error;

/// Environment prefix for every recognised variable, e.g. `RECOMMENDER_DEFAULT_K`.
pub const ENV_PREFIX: &str = "RECOMMENDER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Metrics to build a neighbor index for, comma separated.
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,

    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    /// Minimum neighbor average for a dense-table recommendation.
    #[serde(default = "default_dense_threshold")]
    pub dense_threshold: f64,

    /// Rating domain, handed to callers for request validation.
    #[serde(default = "default_rating_min")]
    pub rating_min: f64,
    #[serde(default = "default_rating_max")]
    pub rating_max: f64,

    /// JSON dataset snapshot loaded by the binary.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

fn default_service_name() -> String {
    "knn-recommender".to_string()
}

fn default_metrics() -> Vec<String> {
    vec![
        "cosine".to_string(),
        "euclidean".to_string(),
        "manhattan".to_string(),
    ]
}

fn default_k() -> usize {
    5
}

fn default_max_k() -> usize {
    50
}

fn default_top_n() -> usize {
    10
}

fn default_dense_threshold() -> f64 {
    3.5
}

fn default_rating_min() -> f64 {
    0.5
}

fn default_rating_max() -> f64 {
    5.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            metrics: default_metrics(),
            default_k: default_k(),
            max_k: default_max_k(),
            default_top_n: default_top_n(),
            dense_threshold: default_dense_threshold(),
            rating_min: default_rating_min(),
            rating_max: default_rating_max(),
            snapshot_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config: Config = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_k == 0 || self.default_top_n == 0 {
            return Err(ConfigError::Invalid(
                "default_k and default_top_n must be positive".to_string(),
            ));
        }
        if self.max_k < self.default_k {
            return Err(ConfigError::Invalid(format!(
                "max_k ({}) must be >= default_k ({})",
                self.max_k, self.default_k
            )));
        }
        if !(self.rating_min < self.rating_max) {
            return Err(ConfigError::Invalid(format!(
                "rating_min ({}) must be below rating_max ({})",
                self.rating_min, self.rating_max
            )));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one index metric is required".to_string(),
            ));
        }
        self.index_metrics().map(|_| ())
    }

    /// Parsed, de-duplicated index metrics in configuration order.
    pub fn index_metrics(&self) -> Result<Vec<Metric>, ConfigError> {
        let mut parsed: Vec<Metric> = Vec::with_capacity(self.metrics.len());
        for name in &self.metrics {
            let metric: Metric = name
                .parse()
                .map_err(|e: crate::error::RecommenderError| ConfigError::Invalid(e.to_string()))?;
            if !parsed.contains(&metric) {
                parsed.push(metric);
            }
        }
        Ok(parsed)
    }

    /// Clamp a caller-supplied neighbor count into `1..=max_k`.
    pub fn clamp_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_k).clamp(1, self.max_k)
    }
}

//! Prometheus collectors for the recommender core

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::OnceLock;
use std::time::Duration;

static METRICS: OnceLock<RecommenderMetricsInner> = OnceLock::new();

struct RecommenderMetricsInner {
    queries: CounterVec,
    index_fit_seconds: HistogramVec,
    upserts: CounterVec,
    errors: CounterVec,
}

impl RecommenderMetricsInner {
    fn new() -> Self {
        Self {
            queries: CounterVec::new(
                Opts::new("knn_recommender_queries_total", "Total core queries"),
                &["operation", "metric"],
            )
            .expect("valid metric definition"),
            index_fit_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "knn_recommender_index_fit_seconds",
                    "Time spent fitting a per-metric neighbor index",
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
                &["metric"],
            )
            .expect("valid metric definition"),
            upserts: CounterVec::new(
                Opts::new("knn_recommender_upserts_total", "Total user row mutations"),
                &["mode"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("knn_recommender_errors_total", "Total core errors"),
                &["kind"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.queries.clone()))?;
        registry.register(Box::new(self.index_fit_seconds.clone()))?;
        registry.register(Box::new(self.upserts.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static RecommenderMetricsInner {
    METRICS.get_or_init(RecommenderMetricsInner::new)
}

/// Recommender metrics wrapper
#[derive(Clone, Default)]
pub struct RecommenderMetrics;

impl RecommenderMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_query(&self, operation: &str, metric: &str) {
        get_metrics()
            .queries
            .with_label_values(&[operation, metric])
            .inc();
    }

    pub fn record_index_fit(&self, metric: &str, elapsed: Duration) {
        get_metrics()
            .index_fit_seconds
            .with_label_values(&[metric])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_upsert(&self, mode: &str) {
        get_metrics().upserts.with_label_values(&[mode]).inc();
    }

    pub fn record_error(&self, kind: &str) {
        get_metrics().errors.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_with_registry() {
        let registry = Registry::new();
        RecommenderMetrics::register(&registry).unwrap();

        let metrics = RecommenderMetrics::new();
        metrics.record_query("neighbors", "cosine");
        metrics.record_index_fit("cosine", Duration::from_millis(3));

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"knn_recommender_queries_total".to_string()));
        assert!(names.contains(&"knn_recommender_index_fit_seconds".to_string()));
    }
}

use anyhow::Context;
use knn_recommender::models::DatasetSnapshot;
use knn_recommender::{
    Config, Metric, RatingsTable, RecommenderError, RecommenderMetrics, RecommenderService,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One request per stdin line, answered with one JSON line on stdout.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Neighbors {
        user_id: i64,
        metric: String,
        k: Option<usize>,
    },
    SimilarUsers {
        user_id: i64,
        metric: String,
        k: Option<usize>,
    },
    Recommend {
        user_id: i64,
        metric: String,
        top_k: Option<usize>,
        top_n: Option<usize>,
        category: Option<String>,
    },
    Upsert {
        user_id: Option<i64>,
        /// JSON object keys are item ids
        ratings: HashMap<String, f64>,
    },
    Row {
        user_id: i64,
    },
    /// Dense table supplied inline; cells are numbers or null
    RecommendTable {
        items: Vec<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
        target: String,
        metric: String,
        k: Option<usize>,
    },
    Search {
        title: Option<String>,
        category: Option<String>,
        top_n: Option<usize>,
    },
    Info,
    Rebuild,
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stdout carries responses, logs go to stderr)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("Failed to load config")?;
    info!(service = %config.service_name, "Starting");

    let registry = Registry::new();
    RecommenderMetrics::register(&registry).context("Failed to register metrics")?;

    let snapshot = load_snapshot(config.snapshot_path.as_deref())?;
    let service = RecommenderService::from_snapshot(snapshot, config)
        .context("Failed to build recommender")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Command>(line) {
            Ok(command) => match handle(&service, &registry, command).await {
                Ok(value) => json!({ "ok": value }),
                Err(e) => json!({ "error": e.to_string(), "kind": e.kind() }),
            },
            Err(e) => {
                warn!(error = %e, "Malformed command");
                json!({ "error": format!("malformed command: {}", e), "kind": "invalid_input" })
            }
        };

        let mut out = serde_json::to_vec(&response).context("Failed to encode response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    info!("Input closed, shutting down");
    Ok(())
}

fn load_snapshot(path: Option<&str>) -> anyhow::Result<DatasetSnapshot> {
    let Some(path) = path else {
        warn!("No snapshot path configured, starting with an empty dataset");
        return Ok(DatasetSnapshot::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path))?;
    let snapshot: DatasetSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse snapshot {}", path))?;

    info!(
        path = %path,
        ratings = snapshot.ratings.len(),
        catalog = snapshot.catalog.len(),
        "Snapshot loaded"
    );
    Ok(snapshot)
}

async fn handle(
    service: &RecommenderService,
    registry: &Registry,
    command: Command,
) -> Result<Value, RecommenderError> {
    let value = match command {
        Command::Neighbors { user_id, metric, k } => {
            let metric: Metric = metric.parse()?;
            to_value(service.neighbors(user_id, metric, k).await?)?
        }
        Command::SimilarUsers { user_id, metric, k } => {
            let metric: Metric = metric.parse()?;
            to_value(service.similar_users(user_id, metric, k).await?)?
        }
        Command::Recommend {
            user_id,
            metric,
            top_k,
            top_n,
            category,
        } => {
            let metric: Metric = metric.parse()?;
            let mut request = service.recommend_request(user_id, metric);
            if let Some(top_k) = top_k {
                request = request.with_top_k(top_k);
            }
            if let Some(top_n) = top_n {
                request = request.with_top_n(top_n);
            }
            if let Some(category) = category {
                request = request.with_category(category);
            }
            to_value(service.recommend(request).await?)?
        }
        Command::Upsert { user_id, ratings } => {
            let ratings = parse_item_keys(ratings)?;
            to_value(service.upsert(user_id, ratings).await?)?
        }
        Command::Row { user_id } => to_value(service.snapshot_row(user_id).await?)?,
        Command::RecommendTable {
            items,
            columns,
            rows,
            target,
            metric,
            k,
        } => {
            let metric: Metric = metric.parse()?;
            let table = Arc::new(RatingsTable::new(items, columns, rows)?);
            to_value(service.recommend_for_table(table, target, metric, k).await?)?
        }
        Command::Search {
            title,
            category,
            top_n,
        } => to_value(service.search(title.as_deref(), category.as_deref(), top_n))?,
        Command::Info => to_value(service.info().await)?,
        Command::Rebuild => to_value(service.rebuild_indexes().await?)?,
        Command::Metrics => {
            let mut buf = Vec::new();
            TextEncoder::new()
                .encode(&registry.gather(), &mut buf)
                .map_err(|e| RecommenderError::Internal(e.to_string()))?;
            Value::String(String::from_utf8_lossy(&buf).into_owned())
        }
    };
    Ok(value)
}

fn parse_item_keys(raw: HashMap<String, f64>) -> Result<HashMap<i64, f64>, RecommenderError> {
    raw.into_iter()
        .map(|(key, rating)| {
            key.trim()
                .parse::<i64>()
                .map(|item_id| (item_id, rating))
                .map_err(|_| RecommenderError::InvalidInput(format!("item id '{}' is not an integer", key)))
        })
        .collect()
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RecommenderError> {
    serde_json::to_value(value).map_err(|e| RecommenderError::Internal(e.to_string()))
}

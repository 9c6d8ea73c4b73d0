//! cluster-job: one-shot DBSCAN over the projected feature space.
//!
//! Requires a persisted feature pipeline (`anomaly-engine train`).

use anyhow::Context;
use clap::Parser;
use tracing::info;

use powerwatch_compute::training::run_clustering;
use powerwatch_compute::ArtifactStore;
use powerwatch_core::Config;
use powerwatch_storage::PgReadingStore;

/// DBSCAN clustering job.
#[derive(Parser, Debug)]
#[command(name = "cluster-job", version, about)]
struct Cli {
    /// Neighborhood radius in PCA space.
    #[arg(long, env = "DBSCAN_EPS")]
    eps: Option<f64>,

    /// Minimum neighbors (including the point itself) for a core point.
    #[arg(long, env = "DBSCAN_MIN_SAMPLES")]
    min_samples: Option<usize>,

    /// Maximum rows to cluster.
    #[arg(long, env = "CLUSTER_SAMPLE_LIMIT")]
    limit: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    powerwatch_core::config::load_dotenv();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(eps) = cli.eps {
        config.model.dbscan_eps = eps;
    }
    if let Some(min_samples) = cli.min_samples {
        config.model.dbscan_min_samples = min_samples;
    }
    if let Some(limit) = cli.limit {
        config.model.cluster_sample_limit = limit;
    }
    config.log_summary();

    let store = PgReadingStore::connect(&config.postgres)
        .await
        .context("connecting to PostgreSQL")?;
    let artifacts = ArtifactStore::new(&config.artifacts.dir);

    let (result, entry) = run_clustering(&store, &artifacts, &config.model)
        .await
        .context("clustering failed")?;

    info!("Clustering saved to {}", entry.file);
    for (label, count) in &result.histogram {
        let name = if label == "-1" { "noise".to_string() } else { format!("cluster {label}") };
        info!("  {:<12} {}", name, count);
    }
    Ok(())
}

//! anomaly-engine: trains the Isolation Forest and runs the scoring loop.
//!
//! Modes:
//! - `train`   fit the feature pipeline and the forest, persist both
//! - `monitor` load persisted artifacts and score unscored rows until Ctrl-C
//! - `once`    load artifacts and run a single scoring cycle
//! - `full`    `train` followed by `monitor`

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use powerwatch_compute::training::train;
use powerwatch_compute::{ArtifactStore, CycleOutcome, ScoringEngine, ScoringRunner};
use powerwatch_core::Config;
use powerwatch_storage::{PgReadingStore, ReadingStore};

/// Household power anomaly engine.
#[derive(Parser, Debug)]
#[command(name = "anomaly-engine", version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Rows scored per cycle.
    #[arg(long, env = "BATCH_SIZE")]
    batch_size: Option<i64>,

    /// Seconds to sleep between cycles.
    #[arg(long, env = "SCORING_INTERVAL")]
    interval: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Fit the feature pipeline and train the forest.
    Train,
    /// Score unscored rows until interrupted.
    Monitor,
    /// Run a single scoring cycle and exit.
    Once,
    /// Train, then monitor.
    Full,
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
    if let Some(batch_size) = cli.batch_size {
        config.scoring.batch_size = batch_size;
    }
    if let Some(interval) = cli.interval {
        config.scoring.poll_interval_secs = interval;
    }
    config.log_summary();
    config.validate().context("invalid configuration")?;

    let mode = cli.mode.unwrap_or(Mode::Full);
    let store: Arc<dyn ReadingStore> = Arc::new(
        PgReadingStore::connect(&config.postgres)
            .await
            .context("connecting to PostgreSQL")?,
    );
    let artifacts = ArtifactStore::new(&config.artifacts.dir);

    if matches!(mode, Mode::Train | Mode::Full) {
        info!("=== Training ===");
        let report = train(store.as_ref(), &artifacts, &config.model)
            .await
            .context("training failed")?;
        info!(
            "Training complete: {} rows, threshold={:.4} ({:?}), {} training rows under threshold",
            report.training_rows, report.threshold, report.threshold_source, report.flagged_in_training
        );
        info!("  pipeline: {}", report.pipeline.file);
        info!("  model:    {}", report.model.file);
    }

    if mode == Mode::Train {
        return Ok(());
    }

    let engine = ScoringEngine::load(&artifacts).context("loading scoring artifacts")?;
    let runner = Arc::new(ScoringRunner::new(
        Arc::clone(&store),
        engine,
        config.scoring.clone(),
        config.roi.clone(),
    ));

    if mode == Mode::Once {
        match runner.run_cycle().await.context("scoring cycle failed")? {
            CycleOutcome::Idle => info!("No unscored rows"),
            CycleOutcome::Scored { processed, anomalies } => {
                info!("Scored {} rows, {} anomalies", processed, anomalies)
            }
        }
        return Ok(());
    }

    info!("=== Monitoring (Ctrl-C to stop) ===");
    let handle = runner.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => handle.shutdown(),
            Err(e) => warn!("failed to listen for ctrl_c: {}", e),
        }
    });

    runner.run().await;
    Ok(())
}

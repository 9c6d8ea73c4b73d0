//! producer: replays household meter readings into `power_consumption`.
//!
//! Reads the UCI `;`-separated file (or generates seeded synthetic readings
//! with `--synthetic N`) and inserts one row per line with a fixed delay.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use powerwatch_core::Config;
use powerwatch_ingest::{open_uci_file, spawn_reader, Producer, ProducerOptions, SyntheticSource};
use powerwatch_storage::PgReadingStore;

/// Household power reading producer.
#[derive(Parser, Debug)]
#[command(name = "producer", version, about)]
struct Cli {
    /// UCI household power consumption file.
    #[arg(long, env = "INGEST_FILE")]
    file: Option<PathBuf>,

    /// Milliseconds to wait between inserts.
    #[arg(long, env = "INGEST_DELAY_MS")]
    delay_ms: Option<u64>,

    /// Stop after inserting this many rows.
    #[arg(long)]
    limit: Option<usize>,

    /// Generate N synthetic readings instead of reading the file.
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,

    /// Seed for `--synthetic`.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl_c: {}", e);
        std::future::pending::<()>().await;
    }
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
    if let Some(file) = cli.file {
        config.ingest.file = file;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.ingest.delay_ms = delay_ms;
    }
    config.log_summary();

    let store = PgReadingStore::connect(&config.postgres)
        .await
        .context("connecting to PostgreSQL")?;
    let producer = Producer::new(ProducerOptions {
        delay: Duration::from_millis(config.ingest.delay_ms),
        limit: cli.limit,
    });

    let stats = match cli.synthetic {
        Some(count) => {
            info!("Producer started: {} synthetic readings (seed {})", count, cli.seed);
            let start = chrono::Utc::now().naive_utc();
            let rows = spawn_reader(SyntheticSource::new(count, cli.seed, start).map(Ok));
            producer.run(&store, rows, ctrl_c()).await
        }
        None => {
            info!("Producer started: {}", config.ingest.file.display());
            let source = open_uci_file(&config.ingest.file)
                .with_context(|| format!("opening {}", config.ingest.file.display()))?;
            producer.run(&store, spawn_reader(source), ctrl_c()).await
        }
    };

    if stats.errors > 0 {
        warn!("{} inserts failed", stats.errors);
    }
    Ok(())
}

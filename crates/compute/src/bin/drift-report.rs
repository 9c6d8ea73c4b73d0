//! drift-report: PSI / KS drift between a baseline and a current window.
//!
//! - `extract` dumps both configured windows from PostgreSQL to CSV snapshots
//! - `analyze` compares two snapshots and writes `psi_scores.csv`,
//!   `drift_report.json` and `baseline_profile.json`

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use powerwatch_compute::drift_job::{analyze, extract};
use powerwatch_core::config::parse_window_bound;
use powerwatch_core::Config;
use powerwatch_storage::PgReadingStore;

/// Drift detection job.
#[derive(Parser, Debug)]
#[command(name = "drift-report", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory for drift reports.
    #[arg(long, env = "REPORT_DIR")]
    report_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump the baseline and current windows to CSV snapshots.
    Extract {
        /// Baseline window start (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS).
        #[arg(long, value_parser = parse_bound)]
        baseline_start: Option<chrono::NaiveDateTime>,
        #[arg(long, value_parser = parse_bound)]
        baseline_end: Option<chrono::NaiveDateTime>,
        #[arg(long, value_parser = parse_bound)]
        current_start: Option<chrono::NaiveDateTime>,
        #[arg(long, value_parser = parse_bound)]
        current_end: Option<chrono::NaiveDateTime>,
    },
    /// Compare two snapshots and write the drift report.
    Analyze {
        /// Baseline snapshot (defaults to the extract output).
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Current snapshot (defaults to the extract output).
        #[arg(long)]
        current: Option<PathBuf>,
    },
}

fn parse_bound(raw: &str) -> Result<chrono::NaiveDateTime, String> {
    parse_window_bound(raw).ok_or_else(|| format!("invalid date '{raw}'"))
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
    if let Some(dir) = cli.report_dir {
        config.drift.report_dir = dir;
    }
    let drift = &mut config.drift;

    match cli.command {
        Command::Extract {
            baseline_start,
            baseline_end,
            current_start,
            current_end,
        } => {
            drift.baseline_start = baseline_start.unwrap_or(drift.baseline_start);
            drift.baseline_end = baseline_end.unwrap_or(drift.baseline_end);
            drift.current_start = current_start.unwrap_or(drift.current_start);
            drift.current_end = current_end.unwrap_or(drift.current_end);

            let store = PgReadingStore::connect(&config.postgres)
                .await
                .context("connecting to PostgreSQL")?;
            let summary = extract(&store, &config.drift).await.context("extract failed")?;
            info!(
                "Extracted {} baseline rows -> {}",
                summary.baseline_rows,
                summary.baseline_file.display()
            );
            info!(
                "Extracted {} current rows -> {}",
                summary.current_rows,
                summary.current_file.display()
            );
        }
        Command::Analyze { baseline, current } => {
            let baseline = baseline.unwrap_or_else(|| drift.baseline_snapshot());
            let current = current.unwrap_or_else(|| drift.current_snapshot());
            let report = analyze(&baseline, &current, &config.drift)
                .with_context(|| format!("analyzing {} vs {}", baseline.display(), current.display()))?;
            println!("{}", report.recommendation.message());
            info!("Reports written to {}", config.drift.report_dir.display());
        }
    }
    Ok(())
}

mod api;
mod auth;
mod cli;
mod doc;
mod page;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use powerwatch_storage::{PgReadingStore, ReadingStore};

use crate::state::AppState;

fn load_config() -> powerwatch_core::Config {
    powerwatch_core::config::load_dotenv();
    powerwatch_core::Config::from_env()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl_c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = cli::Cli::parse();
    let mut config = load_config();
    cli.apply(&mut config);
    config.log_summary();
    config.validate().context("invalid configuration")?;

    if config.dashboard.secret_key == "change-me" {
        warn!("SECRET_KEY is the built-in default; set it before exposing the dashboard");
    }

    let store: Arc<dyn ReadingStore> = Arc::new(
        PgReadingStore::connect(&config.postgres)
            .await
            .context("connecting to PostgreSQL")?,
    );
    let drift_report = cli
        .drift_report
        .clone()
        .unwrap_or_else(|| config.drift.report_path());

    let state = Arc::new(AppState::new(
        store,
        config.dashboard.clone(),
        config.roi.clone(),
        drift_report,
    ));
    let app = router::build_router(state);

    let addr = format!("{}:{}", config.dashboard.host, config.dashboard.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Dashboard listening on http://{}", addr);
    info!("API docs at http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

//! Command-line overrides for the dashboard server.

use std::path::PathBuf;

use clap::Parser;

/// powerwatch dashboard: readings, anomalies and reports behind a login.
#[derive(Parser, Debug)]
#[command(name = "powerwatch-server", version, about)]
pub struct Cli {
    /// Bind address (overrides HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// Drift report served by /api/drift (defaults to REPORT_DIR/drift_report.json).
    #[arg(long, env = "DRIFT_REPORT")]
    pub drift_report: Option<PathBuf>,
}

impl Cli {
    pub fn apply(&self, config: &mut powerwatch_core::Config) {
        if let Some(host) = &self.host {
            config.dashboard.host = host.clone();
        }
        if let Some(port) = self.port {
            config.dashboard.port = port;
        }
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use powerwatch_core::config::{DashboardConfig, RoiConfig};
use powerwatch_storage::ReadingStore;

/// Live session tokens and when they were issued. Cleared on restart.
pub type SessionSet = Arc<RwLock<HashMap<String, DateTime<Utc>>>>;

pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub sessions: SessionSet,
    pub dashboard: DashboardConfig,
    pub roi: RoiConfig,
    /// Where `drift-report analyze` writes its JSON report.
    pub drift_report: PathBuf,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        dashboard: DashboardConfig,
        roi: RoiConfig,
        drift_report: PathBuf,
    ) -> Self {
        Self {
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            dashboard,
            roi,
            drift_report,
        }
    }
}

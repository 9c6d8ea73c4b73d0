use std::env;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::PowerwatchError;

/// Upper bound for any anomaly look-back window (one year).
pub const MAX_WINDOW_MINUTES: i64 = 60 * 24 * 365;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_datetime(profile: &str, key: &str, default: &str) -> NaiveDateTime {
    let raw = profiled_env_or(profile, key, default);
    parse_window_bound(&raw)
        .or_else(|| parse_window_bound(default))
        .unwrap_or_default()
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
pub fn parse_window_bound(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ── Top-level config ──────────────────────────────────────────

/// Process-wide configuration, built once at startup and handed to each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
    pub artifacts: ArtifactConfig,
    pub ingest: IngestConfig,
    pub drift: DriftConfig,
    pub roi: RoiConfig,
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `POWERWATCH_PROFILE`. When set (e.g. `DOCKER`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("POWERWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            model: ModelConfig::from_env_profiled(p),
            scoring: ScoringConfig::from_env_profiled(p),
            artifacts: ArtifactConfig::from_env_profiled(p),
            ingest: IngestConfig::from_env_profiled(p),
            drift: DriftConfig::from_env_profiled(p),
            roi: RoiConfig::from_env_profiled(p),
            dashboard: DashboardConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:   host={}:{}, db={}", self.postgres.host, self.postgres.port, self.postgres.database);
        tracing::info!(
            "  model:      scaler={}, imputation={}, pca_components={}, n_estimators={}, contamination={}",
            self.model.scaler.as_str(),
            self.model.imputation.as_str(),
            self.model.pca_components,
            self.model.n_estimators,
            self.model.contamination
        );
        tracing::info!("  scoring:    batch_size={}, interval={}s", self.scoring.batch_size, self.scoring.poll_interval_secs);
        tracing::info!("  artifacts:  dir={}", self.artifacts.dir.display());
        tracing::info!("  dashboard:  {}:{}, user={}", self.dashboard.host, self.dashboard.port, self.dashboard.username);
    }

    /// Reject settings that would make a component misbehave at runtime.
    pub fn validate(&self) -> Result<(), PowerwatchError> {
        self.scoring.validate()?;
        self.dashboard.validate()
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "DB_HOST", "127.0.0.1"),
            port: profiled_env_parse(p, "DB_PORT", 5432),
            database: profiled_env_or(p, "DB_NAME", "sdid_db"),
            username: profiled_env_or(p, "DB_USER", "sdid_user"),
            password: profiled_env_or(p, "DB_PASSWORD", "sdid_password"),
            max_connections: profiled_env_parse(p, "DB_MAX_CONNECTIONS", 5),
            connect_timeout_secs: profiled_env_parse(p, "DB_CONNECT_TIMEOUT", 5),
        }
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

// ── Model (feature pipeline + forest) ─────────────────────────

/// Scaler applied before the PCA projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    /// Mean / population standard deviation.
    Standard,
    /// Median / interquartile range.
    Robust,
}

impl ScalerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalerKind::Standard => "standard",
            ScalerKind::Robust => "robust",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(ScalerKind::Standard),
            "robust" => Some(ScalerKind::Robust),
            _ => None,
        }
    }
}

/// How missing feature values are filled before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Imputation {
    Zero,
    /// Training-time column mean, stored with the pipeline.
    Mean,
}

impl Imputation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Imputation::Zero => "zero",
            Imputation::Mean => "mean",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zero" => Some(Imputation::Zero),
            "mean" => Some(Imputation::Mean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub scaler: ScalerKind,
    pub imputation: Imputation,
    pub pca_components: usize,
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected anomaly fraction; the threshold is this percentile of training scores.
    pub contamination: f64,
    /// Overrides the percentile-derived threshold when set.
    pub fixed_threshold: Option<f64>,
    pub random_state: u64,
    pub train_sample_limit: i64,
    pub cluster_sample_limit: i64,
    pub dbscan_eps: f64,
    pub dbscan_min_samples: usize,
}

impl ModelConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            scaler: profiled_env_opt(p, "SCALER_KIND")
                .and_then(|v| ScalerKind::parse(&v))
                .unwrap_or(ScalerKind::Standard),
            imputation: profiled_env_opt(p, "IMPUTATION")
                .and_then(|v| Imputation::parse(&v))
                .unwrap_or(Imputation::Mean),
            pca_components: profiled_env_parse(p, "PCA_COMPONENTS", 2),
            n_estimators: profiled_env_parse(p, "N_ESTIMATORS", 200),
            max_samples: profiled_env_parse(p, "MAX_SAMPLES", 256),
            contamination: profiled_env_parse(p, "CONTAMINATION", 0.05),
            fixed_threshold: profiled_env_opt(p, "ANOMALY_THRESHOLD").and_then(|v| v.parse().ok()),
            random_state: profiled_env_parse(p, "RANDOM_STATE", 42),
            train_sample_limit: profiled_env_parse(p, "TRAIN_SAMPLE_LIMIT", 10_000),
            cluster_sample_limit: profiled_env_parse(p, "CLUSTER_SAMPLE_LIMIT", 5_000),
            dbscan_eps: profiled_env_parse(p, "DBSCAN_EPS", 0.5),
            dbscan_min_samples: profiled_env_parse(p, "DBSCAN_MIN_SAMPLES", 10),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            scaler: ScalerKind::Standard,
            imputation: Imputation::Mean,
            pca_components: 2,
            n_estimators: 200,
            max_samples: 256,
            contamination: 0.05,
            fixed_threshold: None,
            random_state: 42,
            train_sample_limit: 10_000,
            cluster_sample_limit: 5_000,
            dbscan_eps: 0.5,
            dbscan_min_samples: 10,
        }
    }
}

// ── Scoring loop ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub batch_size: i64,
    pub poll_interval_secs: u64,
    /// Log an ROI report every N productive cycles.
    pub roi_every_cycles: u64,
}

impl ScoringConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            batch_size: profiled_env_parse(p, "BATCH_SIZE", 200),
            poll_interval_secs: profiled_env_parse(p, "SCORING_INTERVAL", 10),
            roi_every_cycles: profiled_env_parse(p, "ROI_EVERY_CYCLES", 5),
        }
    }

    pub fn validate(&self) -> Result<(), PowerwatchError> {
        if self.batch_size < 1 {
            return Err(PowerwatchError::Config(format!(
                "BATCH_SIZE must be at least 1, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            poll_interval_secs: 10,
            roi_every_cycles: 5,
        }
    }
}

// ── Artifacts ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

impl ArtifactConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dir: PathBuf::from(profiled_env_or(p, "ARTIFACT_DIR", "artifacts")),
        }
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub file: PathBuf,
    pub delay_ms: u64,
}

impl IngestConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            file: PathBuf::from(profiled_env_or(p, "INGEST_FILE", "data/household_power_consumption.txt")),
            delay_ms: profiled_env_parse(p, "INGEST_DELAY_MS", 2000),
        }
    }
}

// ── Drift ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    pub snapshot_dir: PathBuf,
    pub report_dir: PathBuf,
    pub baseline_start: NaiveDateTime,
    pub baseline_end: NaiveDateTime,
    pub current_start: NaiveDateTime,
    pub current_end: NaiveDateTime,
    pub buckets: usize,
    pub psi_alert: f64,
    pub psi_critical: f64,
    pub baseline_precision: f64,
    pub max_precision_loss: f64,
}

impl DriftConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            snapshot_dir: PathBuf::from(profiled_env_or(p, "SNAPSHOT_DIR", "data")),
            report_dir: PathBuf::from(profiled_env_or(p, "REPORT_DIR", "outputs")),
            baseline_start: profiled_env_datetime(p, "DRIFT_BASELINE_START", "2006-12-01"),
            baseline_end: profiled_env_datetime(p, "DRIFT_BASELINE_END", "2006-12-31 23:59:59"),
            current_start: profiled_env_datetime(p, "DRIFT_CURRENT_START", "2007-05-01"),
            current_end: profiled_env_datetime(p, "DRIFT_CURRENT_END", "2007-05-31 23:59:59"),
            buckets: profiled_env_parse(p, "PSI_BUCKETS", 10),
            psi_alert: profiled_env_parse(p, "PSI_ALERT", 0.25),
            psi_critical: profiled_env_parse(p, "PSI_CRITICAL", 0.50),
            baseline_precision: profiled_env_parse(p, "BASELINE_PRECISION", 0.95),
            max_precision_loss: profiled_env_parse(p, "MAX_PRECISION_LOSS", 0.10),
        }
    }

    pub fn baseline_snapshot(&self) -> PathBuf {
        self.snapshot_dir.join("baseline_snapshot.csv")
    }

    pub fn current_snapshot(&self) -> PathBuf {
        self.snapshot_dir.join("current_snapshot.csv")
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir.join("drift_report.json")
    }
}

// ── ROI ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiConfig {
    pub cost_per_outage: f64,
    pub cost_per_false_alert: f64,
    pub true_positive_rate: f64,
    pub prevention_effectiveness: f64,
}

impl RoiConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cost_per_outage: profiled_env_parse(p, "COST_PREVENTED_FAILURE", 5000.0),
            cost_per_false_alert: profiled_env_parse(p, "COST_FALSE_ALARM", 50.0),
            true_positive_rate: profiled_env_parse(p, "TRUE_POSITIVE_RATE", 0.80),
            prevention_effectiveness: profiled_env_parse(p, "PREVENTION_EFFECTIVENESS", 0.70),
        }
    }
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            cost_per_outage: 5000.0,
            cost_per_false_alert: 50.0,
            true_positive_rate: 0.80,
            prevention_effectiveness: 0.70,
        }
    }
}

// ── Dashboard ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub recent_anomaly_minutes: i64,
    pub alert_window_minutes: i64,
    /// Sessions older than this are rejected and pruned.
    pub session_ttl_minutes: i64,
}

impl DashboardConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 5000),
            username: profiled_env_or(p, "DASHBOARD_USERNAME", "admin"),
            password: profiled_env_or(p, "DASHBOARD_PASSWORD", "admin"),
            secret_key: profiled_env_or(p, "SECRET_KEY", "change-me"),
            recent_anomaly_minutes: profiled_env_parse(p, "RECENT_ANOMALY_MINUTES", 10),
            alert_window_minutes: profiled_env_parse(p, "ALERT_WINDOW_MINUTES", 1),
            session_ttl_minutes: profiled_env_parse(p, "SESSION_TTL_MINUTES", 720),
        }
    }

    pub fn validate(&self) -> Result<(), PowerwatchError> {
        for (key, value) in [
            ("RECENT_ANOMALY_MINUTES", self.recent_anomaly_minutes),
            ("ALERT_WINDOW_MINUTES", self.alert_window_minutes),
            ("SESSION_TTL_MINUTES", self.session_ttl_minutes),
        ] {
            if !(1..=MAX_WINDOW_MINUTES).contains(&value) {
                return Err(PowerwatchError::Config(format!(
                    "{key} must be between 1 and {MAX_WINDOW_MINUTES}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bound_accepts_date_and_datetime() {
        let d = parse_window_bound("2006-12-01").unwrap();
        assert_eq!(d.to_string(), "2006-12-01 00:00:00");
        let dt = parse_window_bound("2007-05-31 23:59:59").unwrap();
        assert_eq!(dt.to_string(), "2007-05-31 23:59:59");
        assert!(parse_window_bound("31/05/2007").is_none());
    }

    #[test]
    fn scaler_and_imputation_parse_case_insensitive() {
        assert_eq!(ScalerKind::parse("Robust"), Some(ScalerKind::Robust));
        assert_eq!(ScalerKind::parse("minmax"), None);
        assert_eq!(Imputation::parse("ZERO"), Some(Imputation::Zero));
    }

    #[test]
    fn connection_string_includes_all_parts() {
        let pg = PostgresConfig {
            host: "db".into(),
            port: 5433,
            database: "power".into(),
            username: "u".into(),
            password: "p".into(),
            max_connections: 2,
            connect_timeout_secs: 5,
        };
        assert_eq!(pg.connection_string(), "postgres://u:p@db:5433/power");
    }

    #[test]
    fn zero_or_negative_batch_size_is_rejected() {
        let mut scoring = ScoringConfig::default();
        assert!(scoring.validate().is_ok());
        scoring.batch_size = 0;
        assert!(matches!(scoring.validate(), Err(PowerwatchError::Config(_))));
        scoring.batch_size = -5;
        let err = scoring.validate().unwrap_err();
        assert!(err.to_string().contains("BATCH_SIZE"));
    }

    #[test]
    fn dashboard_windows_must_be_bounded() {
        let mut cfg = Config::for_profile("POWERWATCH_TEST_UNSET_PROFILE");
        assert!(cfg.validate().is_ok());
        cfg.dashboard.recent_anomaly_minutes = 1_000_000_000_000;
        assert!(cfg.dashboard.validate().is_err());
        cfg.dashboard.recent_anomaly_minutes = 10;
        cfg.dashboard.alert_window_minutes = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("ALERT_WINDOW_MINUTES"));
    }

    #[test]
    fn dashboard_secrets_are_not_serialized() {
        let cfg = Config::for_profile("POWERWATCH_TEST_UNSET_PROFILE");
        let json = serde_json::to_value(&cfg.dashboard).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("secret_key").is_none());
        assert!(json.get("username").is_some());
    }
}

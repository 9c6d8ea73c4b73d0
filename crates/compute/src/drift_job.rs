//! Drift analysis between two time windows of the table.
//!
//! `extract` dumps both windows to CSV snapshots; `analyze` compares the
//! snapshots feature by feature and writes the report files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use powerwatch_core::config::DriftConfig;
use powerwatch_storage::{read_snapshot, write_snapshot, ReadingStore, Snapshot};

use crate::algorithms::drift::{ks_2samp, psi};
use crate::algorithms::stats;
use crate::error::ComputeError;

pub const PSI_SCORES_FILE: &str = "psi_scores.csv";
pub const DRIFT_REPORT_FILE: &str = "drift_report.json";
pub const BASELINE_PROFILE_FILE: &str = "baseline_profile.json";

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub baseline_rows: usize,
    pub current_rows: usize,
    pub baseline_file: PathBuf,
    pub current_file: PathBuf,
}

/// Dump the configured baseline and current windows to CSV snapshots.
pub async fn extract(store: &dyn ReadingStore, cfg: &DriftConfig) -> Result<ExtractSummary, ComputeError> {
    let baseline = store.fetch_window(cfg.baseline_start, cfg.baseline_end).await?;
    let current = store.fetch_window(cfg.current_start, cfg.current_end).await?;
    if baseline.is_empty() {
        warn!("Baseline window {} .. {} is empty", cfg.baseline_start, cfg.baseline_end);
    }
    if current.is_empty() {
        warn!("Current window {} .. {} is empty", cfg.current_start, cfg.current_end);
    }

    let baseline_file = cfg.baseline_snapshot();
    let current_file = cfg.current_snapshot();
    write_snapshot(&baseline_file, &baseline)?;
    write_snapshot(&current_file, &current)?;

    Ok(ExtractSummary {
        baseline_rows: baseline.len(),
        current_rows: current.len(),
        baseline_file,
        current_file,
    })
}

/// Drift statistics for one feature. `None` marks an undefined value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub psi: Option<f64>,
    pub ks_stat: Option<f64>,
    pub ks_pvalue: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Retrain,
    Monitor,
    Stable,
}

impl Recommendation {
    pub fn from_max_psi(max_psi: Option<f64>, alert: f64, critical: f64) -> Self {
        match max_psi {
            Some(p) if p > critical => Recommendation::Retrain,
            Some(p) if p > alert => Recommendation::Monitor,
            _ => Recommendation::Stable,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::Retrain => "Severe drift: retraining recommended",
            Recommendation::Monitor => "Moderate drift: keep monitoring",
            Recommendation::Stable => "Model stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub psi_threshold_alert: f64,
    pub psi_threshold_critical: f64,
}

/// Precision proxy: share of current rows the model did not flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub baseline_precision: f64,
    pub current_precision: f64,
    pub precision_loss: f64,
    pub degraded: bool,
}

impl ModelPerformance {
    pub fn evaluate(flags: &[bool], cfg: &DriftConfig) -> Option<Self> {
        if flags.is_empty() {
            return None;
        }
        let anomaly_rate = flags.iter().filter(|&&f| f).count() as f64 / flags.len() as f64;
        let current_precision = 1.0 - anomaly_rate;
        let precision_loss = cfg.baseline_precision - current_precision;
        Some(Self {
            baseline_precision: cfg.baseline_precision,
            current_precision,
            precision_loss,
            degraded: precision_loss > cfg.max_precision_loss,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProfile {
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std: f64,
    pub count: usize,
}

pub type BaselineProfile = BTreeMap<String, FeatureProfile>;

pub fn baseline_profile(snapshot: &Snapshot) -> BaselineProfile {
    snapshot
        .columns
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| {
            let n = values.len();
            let std = if n > 1 {
                stats::std_pop(values) * (n as f64 / (n - 1) as f64).sqrt()
            } else {
                0.0
            };
            (
                name.clone(),
                FeatureProfile {
                    mean: stats::mean(values),
                    std,
                    count: n,
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub baseline_file: String,
    pub current_file: String,
    pub baseline_rows: usize,
    pub current_rows: usize,
    pub features_checked: Vec<String>,
    pub results: BTreeMap<String, FeatureDrift>,
    pub max_psi: Option<f64>,
    pub interpretation: Interpretation,
    pub recommendation: Recommendation,
    pub model_performance: Option<ModelPerformance>,
}

#[derive(Debug, Serialize)]
struct PsiRow<'a> {
    feature: &'a str,
    psi: Option<f64>,
    ks_stat: Option<f64>,
    ks_pvalue: Option<f64>,
}

fn defined(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Compare two snapshots already in memory.
pub fn compare(baseline: &Snapshot, current: &Snapshot, cfg: &DriftConfig) -> DriftReport {
    let features = baseline.shared_features(current);
    let mut results = BTreeMap::new();

    for feature in &features {
        let b = baseline.column(feature).unwrap_or_default();
        let c = current.column(feature).unwrap_or_default();
        let ks = ks_2samp(b, c);
        results.insert(
            feature.to_string(),
            FeatureDrift {
                psi: defined(psi(b, c, cfg.buckets)),
                ks_stat: defined(ks.statistic),
                ks_pvalue: defined(ks.p_value),
            },
        );
    }

    let max_psi = results
        .values()
        .filter_map(|r| r.psi)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |m| m.max(p))));

    DriftReport {
        generated_at: Utc::now(),
        baseline_file: String::new(),
        current_file: String::new(),
        baseline_rows: baseline.rows,
        current_rows: current.rows,
        features_checked: features.iter().map(|f| f.to_string()).collect(),
        results,
        max_psi,
        interpretation: Interpretation {
            psi_threshold_alert: cfg.psi_alert,
            psi_threshold_critical: cfg.psi_critical,
        },
        recommendation: Recommendation::from_max_psi(max_psi, cfg.psi_alert, cfg.psi_critical),
        model_performance: ModelPerformance::evaluate(&current.is_anomaly, cfg),
    }
}

/// Load both snapshots, compare them, and write the report files into `cfg.report_dir`.
pub fn analyze(baseline_file: &Path, current_file: &Path, cfg: &DriftConfig) -> Result<DriftReport, ComputeError> {
    let baseline = read_snapshot(baseline_file)?;
    let current = read_snapshot(current_file)?;
    info!(
        "Drift analysis: baseline {} rows, current {} rows",
        baseline.rows, current.rows
    );

    let mut report = compare(&baseline, &current, cfg);
    report.baseline_file = baseline_file.display().to_string();
    report.current_file = current_file.display().to_string();

    fs::create_dir_all(&cfg.report_dir)?;

    let mut writer = csv::Writer::from_path(cfg.report_dir.join(PSI_SCORES_FILE))?;
    for (feature, r) in &report.results {
        writer.serialize(PsiRow {
            feature,
            psi: r.psi,
            ks_stat: r.ks_stat,
            ks_pvalue: r.ks_pvalue,
        })?;
    }
    writer.flush()?;

    fs::write(
        cfg.report_dir.join(DRIFT_REPORT_FILE),
        serde_json::to_vec_pretty(&report)?,
    )?;
    fs::write(
        cfg.report_dir.join(BASELINE_PROFILE_FILE),
        serde_json::to_vec_pretty(&baseline_profile(&baseline))?,
    )?;

    for (feature, r) in &report.results {
        info!(
            "  {:<26} psi={:<10} ks={:<8} p={}",
            feature,
            fmt_opt(r.psi),
            fmt_opt(r.ks_stat),
            fmt_opt(r.ks_pvalue)
        );
    }
    if let Some(perf) = &report.model_performance {
        info!(
            "Model performance: precision {:.3} -> {:.3} (loss {:.2}%){}",
            perf.baseline_precision,
            perf.current_precision,
            perf.precision_loss * 100.0,
            if perf.degraded { ", degraded" } else { "" }
        );
    }
    info!("{} (max PSI {})", report.recommendation.message(), fmt_opt(report.max_psi));
    Ok(report)
}

/// Read a previously written drift report.
pub fn load_report(path: &Path) -> Result<DriftReport, ComputeError> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::normal_readings;
    use chrono::Duration;
    use powerwatch_core::config::parse_window_bound;
    use powerwatch_storage::MemoryReadingStore;

    fn cfg(dir: &Path) -> DriftConfig {
        DriftConfig {
            snapshot_dir: dir.join("data"),
            report_dir: dir.join("outputs"),
            baseline_start: parse_window_bound("2006-12-16").unwrap(),
            baseline_end: parse_window_bound("2006-12-16 23:59:59").unwrap(),
            current_start: parse_window_bound("2006-12-17").unwrap(),
            current_end: parse_window_bound("2006-12-17 23:59:59").unwrap(),
            buckets: 10,
            psi_alert: 0.25,
            psi_critical: 0.50,
            baseline_precision: 0.95,
            max_precision_loss: 0.10,
        }
    }

    #[test]
    fn recommendation_thresholds() {
        assert_eq!(Recommendation::from_max_psi(Some(0.6), 0.25, 0.5), Recommendation::Retrain);
        assert_eq!(Recommendation::from_max_psi(Some(0.3), 0.25, 0.5), Recommendation::Monitor);
        assert_eq!(Recommendation::from_max_psi(Some(0.25), 0.25, 0.5), Recommendation::Stable);
        assert_eq!(Recommendation::from_max_psi(None, 0.25, 0.5), Recommendation::Stable);
    }

    #[test]
    fn model_performance_flags_degradation() {
        let dir = tempfile::tempdir().unwrap();
        let c = cfg(dir.path());
        let mut flags = vec![false; 80];
        flags.extend(vec![true; 20]);
        let perf = ModelPerformance::evaluate(&flags, &c).unwrap();
        assert!((perf.current_precision - 0.8).abs() < 1e-12);
        assert!(perf.degraded);

        let ok = ModelPerformance::evaluate(&[false; 100], &c).unwrap();
        assert!(!ok.degraded);
        assert!(ModelPerformance::evaluate(&[], &c).is_none());
    }

    #[tokio::test]
    async fn extract_then_analyze_writes_all_reports() {
        let dir = tempfile::tempdir().unwrap();
        let c = cfg(dir.path());
        let store = MemoryReadingStore::new();

        // Day one as generated, day two with power and intensity doubled.
        store.insert_readings(&normal_readings(300, 1)).await.unwrap();
        let shifted: Vec<_> = normal_readings(300, 2)
            .into_iter()
            .map(|mut r| {
                r.ts += Duration::days(1);
                r.global_active_power_kw = r.global_active_power_kw.map(|p| p * 2.0);
                r.global_intensity_a = r.global_intensity_a.map(|i| i * 2.0);
                r
            })
            .collect();
        store.insert_readings(&shifted).await.unwrap();

        let summary = extract(&store, &c).await.unwrap();
        assert_eq!(summary.baseline_rows, 300);
        assert_eq!(summary.current_rows, 300);

        let report = analyze(&summary.baseline_file, &summary.current_file, &c).unwrap();
        assert_eq!(report.features_checked.len(), 7);
        assert_eq!(report.recommendation, Recommendation::Retrain);

        let power = &report.results["global_active_power_kw"];
        let voltage = &report.results["voltage_v"];
        assert!(power.psi.unwrap() > 0.5);
        assert!(voltage.psi.unwrap() < 0.25);
        assert!(power.ks_pvalue.unwrap() < 0.01);
        // Nothing was scored, so there is no precision proxy.
        assert!(report.model_performance.is_none());

        let reloaded = load_report(&c.report_dir.join(DRIFT_REPORT_FILE)).unwrap();
        assert_eq!(reloaded.recommendation, report.recommendation);
        assert_eq!(reloaded.features_checked, report.features_checked);
        assert!((reloaded.max_psi.unwrap() - report.max_psi.unwrap()).abs() < 1e-9);
        assert!(c.report_dir.join(PSI_SCORES_FILE).exists());

        let profile: BaselineProfile = serde_json::from_slice(
            &fs::read(c.report_dir.join(BASELINE_PROFILE_FILE)).unwrap(),
        )
        .unwrap();
        let p = &profile["global_active_power_kw"];
        assert!(p.mean > 2.5 && p.mean < 3.5);
        assert_eq!(p.count, 300);
    }

    #[test]
    fn identical_snapshots_are_stable() {
        let snap = Snapshot {
            rows: 100,
            columns: BTreeMap::from([(
                "voltage_v".to_string(),
                (0..100).map(|i| 220.0 + i as f64 * 0.2).collect(),
            )]),
            is_anomaly: Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let report = compare(&snap, &snap, &cfg(dir.path()));
        assert_eq!(report.recommendation, Recommendation::Stable);
        assert!(report.results["voltage_v"].psi.unwrap().abs() < 1e-12);
    }
}

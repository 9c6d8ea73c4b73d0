use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algorithms::isolation_forest::IsolationForest;
use crate::algorithms::stats;

/// Where the anomaly threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    /// Percentile of training scores at `contamination * 100`.
    Contamination,
    /// Fixed by configuration.
    Fixed,
}

/// Summary of the training-set score distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p05: f64,
    pub p50: f64,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[f64]) -> Self {
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            min: sorted.first().copied().unwrap_or(f64::NAN),
            max: sorted.last().copied().unwrap_or(f64::NAN),
            mean: stats::mean(&sorted),
            p05: stats::percentile_sorted(&sorted, 5.0),
            p50: stats::percentile_sorted(&sorted, 50.0),
        }
    }
}

/// Trained forest plus the decision threshold applied to its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyModel {
    pub forest: IsolationForest,
    pub threshold: f64,
    pub threshold_source: ThresholdSource,
    pub contamination: f64,
    /// SHA-256 of the feature pipeline artifact the forest was trained on.
    pub pipeline_digest: String,
    pub training_rows: usize,
    pub training_scores: ScoreSummary,
    pub trained_at: DateTime<Utc>,
}

impl AnomalyModel {
    /// `score < threshold` marks an anomaly.
    pub fn is_anomaly(&self, score: f64) -> bool {
        score < self.threshold
    }
}

/// Persisted outcome of a DBSCAN run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringArtifact {
    pub eps: f64,
    pub min_samples: usize,
    pub n_samples: usize,
    pub num_clusters: usize,
    pub noise_points: usize,
    /// Cluster label (as string, `"-1"` = noise) to member count.
    pub histogram: BTreeMap<String, usize>,
    pub pipeline_digest: String,
    pub created_at: DateTime<Utc>,
}

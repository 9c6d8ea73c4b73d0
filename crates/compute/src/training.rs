//! One-shot training jobs: feature pipeline fit, forest training, clustering.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use powerwatch_core::config::ModelConfig;
use powerwatch_core::FeatureRow;
use powerwatch_storage::ReadingStore;

use crate::algorithms::dbscan::dbscan;
use crate::algorithms::isolation_forest::{ForestParams, IsolationForest};
use crate::algorithms::stats;
use crate::artifacts::{ArtifactEntry, ArtifactKind, ArtifactStore};
use crate::error::ComputeError;
use crate::model::{AnomalyModel, ClusteringArtifact, ScoreSummary, ThresholdSource};
use crate::transform::FeaturePipeline;

/// Outcome of a full training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub pipeline: ArtifactEntry,
    pub model: ArtifactEntry,
    pub training_rows: usize,
    pub threshold: f64,
    pub threshold_source: ThresholdSource,
    /// Training rows that score below the threshold.
    pub flagged_in_training: usize,
}

fn validate(cfg: &ModelConfig) -> Result<(), ComputeError> {
    if !(cfg.contamination > 0.0 && cfg.contamination <= 0.5) {
        return Err(ComputeError::InvalidParameter(format!(
            "contamination must be in (0, 0.5], got {}",
            cfg.contamination
        )));
    }
    if cfg.train_sample_limit <= 0 {
        return Err(ComputeError::InvalidParameter("TRAIN_SAMPLE_LIMIT must be positive".into()));
    }
    Ok(())
}

/// Fit imputation + scaler + PCA on a bounded historical sample and persist it.
pub async fn fit_feature_pipeline(
    store: &dyn ReadingStore,
    artifacts: &ArtifactStore,
    cfg: &ModelConfig,
) -> Result<(FeaturePipeline, ArtifactEntry), ComputeError> {
    validate(cfg)?;
    let readings = store.fetch_training(cfg.train_sample_limit).await?;
    info!("Feature pipeline: fitting on {} historical rows", readings.len());

    let rows: Vec<FeatureRow> = readings.iter().map(|r| r.features()).collect();
    let pipeline = FeaturePipeline::fit(&rows, cfg.scaler, cfg.imputation, cfg.pca_components)?;
    info!(
        "Feature pipeline fitted: scaler={}, components={}, explained_variance_ratio={:?}",
        cfg.scaler.as_str(),
        pipeline.output_dim(),
        pipeline.pca.explained_variance_ratio
    );

    let entry = artifacts.save(ArtifactKind::FeaturePipeline, &pipeline)?;
    Ok((pipeline, entry))
}

/// Train the Isolation Forest on historical rows projected through the stored pipeline.
pub async fn train_anomaly_model(
    store: &dyn ReadingStore,
    artifacts: &ArtifactStore,
    cfg: &ModelConfig,
) -> Result<(AnomalyModel, ArtifactEntry), ComputeError> {
    validate(cfg)?;
    let (pipeline, pipeline_entry): (FeaturePipeline, _) =
        artifacts.load(ArtifactKind::FeaturePipeline)?;

    let readings = store.fetch_training(cfg.train_sample_limit).await?;
    let x = pipeline.transform_readings(&readings);
    info!("Anomaly model: training on {} rows, shape ({}, {})", x.len(), x.len(), pipeline.output_dim());

    let params = ForestParams {
        n_estimators: cfg.n_estimators,
        max_samples: cfg.max_samples,
        random_state: cfg.random_state,
    };
    let forest = IsolationForest::fit(&x, params)?;
    let scores = forest.score_samples(&x)?;

    let (threshold, threshold_source) = match cfg.fixed_threshold {
        Some(t) => (t, ThresholdSource::Fixed),
        None => (
            stats::percentile(&scores, cfg.contamination * 100.0),
            ThresholdSource::Contamination,
        ),
    };

    let model = AnomalyModel {
        forest,
        threshold,
        threshold_source,
        contamination: cfg.contamination,
        pipeline_digest: pipeline_entry.sha256.clone(),
        training_rows: x.len(),
        training_scores: ScoreSummary::from_scores(&scores),
        trained_at: Utc::now(),
    };
    info!(
        "Anomaly model trained: threshold={:.4} ({:?}), trees={}, sample_size={}",
        model.threshold,
        model.threshold_source,
        model.forest.trees.len(),
        model.forest.sample_size
    );

    let entry = artifacts.save(ArtifactKind::AnomalyModel, &model)?;
    Ok((model, entry))
}

/// Fit the pipeline, then the forest on top of it.
pub async fn train(
    store: &dyn ReadingStore,
    artifacts: &ArtifactStore,
    cfg: &ModelConfig,
) -> Result<TrainingReport, ComputeError> {
    let (pipeline, pipeline_entry) = fit_feature_pipeline(store, artifacts, cfg).await?;
    let (model, model_entry) = train_anomaly_model(store, artifacts, cfg).await?;

    // Re-score the training set only to report how many rows sit under the threshold.
    let readings = store.fetch_training(cfg.train_sample_limit).await?;
    let scores = model.forest.score_samples(&pipeline.transform_readings(&readings))?;
    let flagged_in_training = scores.iter().filter(|&&s| model.is_anomaly(s)).count();

    Ok(TrainingReport {
        pipeline: pipeline_entry,
        model: model_entry,
        training_rows: model.training_rows,
        threshold: model.threshold,
        threshold_source: model.threshold_source,
        flagged_in_training,
    })
}

/// Project a bounded sample through the stored pipeline, run DBSCAN and persist the result.
pub async fn run_clustering(
    store: &dyn ReadingStore,
    artifacts: &ArtifactStore,
    cfg: &ModelConfig,
) -> Result<(ClusteringArtifact, ArtifactEntry), ComputeError> {
    if cfg.dbscan_eps <= 0.0 || cfg.dbscan_min_samples == 0 {
        return Err(ComputeError::InvalidParameter(
            "DBSCAN eps must be positive and min_samples at least 1".into(),
        ));
    }
    let (pipeline, pipeline_entry): (FeaturePipeline, _) =
        artifacts.load(ArtifactKind::FeaturePipeline)?;

    let readings = store.fetch_clustering_sample(cfg.cluster_sample_limit).await?;
    if readings.is_empty() {
        return Err(ComputeError::InsufficientData("no rows to cluster".into()));
    }
    let x = pipeline.transform_readings(&readings);
    info!(
        "Clustering {} rows (eps={}, min_samples={})",
        x.len(),
        cfg.dbscan_eps,
        cfg.dbscan_min_samples
    );

    let result = dbscan(&x, cfg.dbscan_eps, cfg.dbscan_min_samples);
    let artifact = ClusteringArtifact {
        eps: cfg.dbscan_eps,
        min_samples: cfg.dbscan_min_samples,
        n_samples: x.len(),
        num_clusters: result.num_clusters,
        noise_points: result.noise_count(),
        histogram: result.histogram(),
        pipeline_digest: pipeline_entry.sha256.clone(),
        created_at: Utc::now(),
    };
    info!(
        "DBSCAN found {} clusters, {} noise points",
        artifact.num_clusters, artifact.noise_points
    );

    let entry = artifacts.save(ArtifactKind::Clustering, &artifact)?;
    Ok((artifact, entry))
}

use tracing::info;

use powerwatch_core::{Reading, ScoreUpdate};

use crate::artifacts::{ArtifactEntry, ArtifactError, ArtifactKind, ArtifactStore};
use crate::error::ComputeError;
use crate::model::AnomalyModel;
use crate::transform::FeaturePipeline;

/// Feature pipeline and anomaly model loaded together for scoring.
pub struct ScoringEngine {
    pipeline: FeaturePipeline,
    model: AnomalyModel,
    pipeline_entry: ArtifactEntry,
    model_entry: ArtifactEntry,
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("pipeline", &self.pipeline_entry.file)
            .field("model", &self.model_entry.file)
            .field("threshold", &self.model.threshold)
            .finish()
    }
}

impl ScoringEngine {
    /// Load the newest pipeline and model. Fails if either is missing, corrupt,
    /// or the model was trained against a different pipeline.
    pub fn load(artifacts: &ArtifactStore) -> Result<Self, ComputeError> {
        let (pipeline, pipeline_entry): (FeaturePipeline, _) =
            artifacts.load(ArtifactKind::FeaturePipeline)?;
        let (model, model_entry): (AnomalyModel, _) = artifacts.load(ArtifactKind::AnomalyModel)?;
        let engine = Self::new(pipeline, pipeline_entry, model, model_entry)?;
        info!(
            "Scoring engine loaded: pipeline={} model={} threshold={:.4}",
            engine.pipeline_entry.file, engine.model_entry.file, engine.model.threshold
        );
        Ok(engine)
    }

    pub fn new(
        pipeline: FeaturePipeline,
        pipeline_entry: ArtifactEntry,
        model: AnomalyModel,
        model_entry: ArtifactEntry,
    ) -> Result<Self, ComputeError> {
        if model.pipeline_digest != pipeline_entry.sha256 {
            return Err(ArtifactError::PipelineMismatch {
                expected: model.pipeline_digest.clone(),
                actual: pipeline_entry.sha256.clone(),
            }
            .into());
        }
        if model.forest.n_features != pipeline.output_dim() {
            return Err(ComputeError::DimensionMismatch {
                expected: model.forest.n_features,
                actual: pipeline.output_dim(),
            });
        }
        Ok(Self {
            pipeline,
            model,
            pipeline_entry,
            model_entry,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.model.threshold
    }

    /// Transform and score a batch, one update per reading in input order.
    pub fn score(&self, readings: &[Reading]) -> Result<Vec<ScoreUpdate>, ComputeError> {
        let x = self.pipeline.transform_readings(readings);
        let scores = self.model.forest.score_samples(&x)?;
        Ok(readings
            .iter()
            .zip(scores)
            .map(|(r, score)| ScoreUpdate {
                id: r.id,
                anomaly_score: score,
                is_anomaly: self.model.is_anomaly(score),
            })
            .collect())
    }
}

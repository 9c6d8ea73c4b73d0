pub mod algorithms;
pub mod artifacts;
pub mod drift_job;
pub mod error;
pub mod model;
pub mod roi;
pub mod scoring;
pub mod training;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactEntry, ArtifactError, ArtifactKind, ArtifactStore};
pub use error::ComputeError;
pub use model::{AnomalyModel, ClusteringArtifact, ThresholdSource};
pub use roi::RoiReport;
pub use scoring::{CycleOutcome, ScoringEngine, ScoringMetrics, ScoringRunner, ShutdownHandle};
pub use transform::FeaturePipeline;

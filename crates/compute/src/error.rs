use powerwatch_storage::StorageError;

use crate::artifacts::ArtifactError;

/// Error type for training, scoring and drift jobs.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

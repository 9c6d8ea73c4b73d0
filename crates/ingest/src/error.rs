use powerwatch_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unparsable timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

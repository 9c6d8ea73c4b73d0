pub mod dbscan;
pub mod drift;
pub mod isolation_forest;
pub mod pca;
pub mod scaler;
pub mod stats;

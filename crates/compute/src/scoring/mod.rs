//! Anomaly scoring: a loaded [`ScoringEngine`] driven by a polling [`ScoringRunner`].

pub mod engine;
pub mod metrics;
pub mod runner;

pub use engine::ScoringEngine;
pub use metrics::ScoringMetrics;
pub use runner::{CycleOutcome, ScoringRunner, ShutdownHandle};

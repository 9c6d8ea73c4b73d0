use chrono::{DateTime, Utc};
use serde::Serialize;

/// Running counters for the scoring loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringMetrics {
    /// Cycles attempted, including empty and failed ones.
    pub cycles: u64,
    /// Cycles that scored at least one row.
    pub productive_cycles: u64,
    pub processed: u64,
    pub anomalies: u64,
    pub failed_batches: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl ScoringMetrics {
    pub fn record_empty(&mut self) {
        self.cycles += 1;
        self.last_cycle_at = Some(Utc::now());
    }

    pub fn record_batch(&mut self, processed: u64, anomalies: u64) {
        self.cycles += 1;
        self.productive_cycles += 1;
        self.processed += processed;
        self.anomalies += anomalies;
        self.last_cycle_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.cycles += 1;
        self.failed_batches += 1;
        self.last_cycle_at = Some(Utc::now());
    }

    pub fn anomaly_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.anomalies as f64 / self.processed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut m = ScoringMetrics::default();
        m.record_empty();
        m.record_batch(200, 7);
        m.record_failure();
        m.record_batch(100, 3);

        assert_eq!(m.cycles, 4);
        assert_eq!(m.productive_cycles, 2);
        assert_eq!(m.processed, 300);
        assert_eq!(m.anomalies, 10);
        assert_eq!(m.failed_batches, 1);
        assert!((m.anomaly_rate() - 10.0 / 300.0).abs() < 1e-12);
        assert!(m.last_cycle_at.is_some());
    }

    #[test]
    fn empty_rate_is_zero() {
        assert_eq!(ScoringMetrics::default().anomaly_rate(), 0.0);
    }
}

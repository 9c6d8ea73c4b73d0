use serde::{Deserialize, Serialize};
use tracing::info;

use powerwatch_core::config::RoiConfig;

/// Economic estimate of what the detector saves versus what its alerts cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiReport {
    pub total_processed: u64,
    pub total_anomalies: u64,
    pub anomaly_rate_pct: f64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub outages_prevented: u64,
    pub savings: f64,
    pub investigation_cost: f64,
    pub net_benefit: f64,
    pub roi_pct: f64,
}

impl RoiReport {
    /// `None` when nothing has been processed yet.
    pub fn compute(total_processed: u64, total_anomalies: u64, cfg: &RoiConfig) -> Option<Self> {
        if total_processed == 0 {
            return None;
        }

        let true_positives = (total_anomalies as f64 * cfg.true_positive_rate).floor() as u64;
        let false_positives = total_anomalies - true_positives.min(total_anomalies);
        let outages_prevented = (true_positives as f64 * cfg.prevention_effectiveness).floor() as u64;

        let savings = outages_prevented as f64 * cfg.cost_per_outage;
        let investigation_cost = total_anomalies as f64 * cfg.cost_per_false_alert;
        let net_benefit = savings - investigation_cost;
        let roi_pct = if investigation_cost > 0.0 {
            net_benefit / investigation_cost * 100.0
        } else {
            0.0
        };

        Some(Self {
            total_processed,
            total_anomalies,
            anomaly_rate_pct: round2(total_anomalies as f64 / total_processed as f64 * 100.0),
            true_positives,
            false_positives,
            outages_prevented,
            savings: round2(savings),
            investigation_cost: round2(investigation_cost),
            net_benefit: round2(net_benefit),
            roi_pct: round2(roi_pct),
        })
    }

    pub fn log(&self) {
        info!("ROI report:");
        info!("  processed={} anomalies={} rate={}%", self.total_processed, self.total_anomalies, self.anomaly_rate_pct);
        info!("  tp={} fp={} prevented={}", self.true_positives, self.false_positives, self.outages_prevented);
        info!(
            "  savings={:.2} cost={:.2} net={:.2} roi={}%",
            self.savings, self.investigation_cost, self.net_benefit, self.roi_pct
        );
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_processed_gives_no_report() {
        assert!(RoiReport::compute(0, 0, &RoiConfig::default()).is_none());
    }

    #[test]
    fn default_constants() {
        let r = RoiReport::compute(1000, 50, &RoiConfig::default()).unwrap();
        assert_eq!(r.true_positives, 40);
        assert_eq!(r.false_positives, 10);
        assert_eq!(r.outages_prevented, 28);
        assert_eq!(r.savings, 140_000.0);
        assert_eq!(r.investigation_cost, 2_500.0);
        assert_eq!(r.net_benefit, 137_500.0);
        assert_eq!(r.roi_pct, 5500.0);
        assert_eq!(r.anomaly_rate_pct, 5.0);
    }

    #[test]
    fn flooring_and_zero_cost() {
        let r = RoiReport::compute(10, 3, &RoiConfig::default()).unwrap();
        // 3 * 0.8 = 2.4 -> 2, 2 * 0.7 = 1.4 -> 1
        assert_eq!(r.true_positives, 2);
        assert_eq!(r.false_positives, 1);
        assert_eq!(r.outages_prevented, 1);

        let none = RoiReport::compute(10, 0, &RoiConfig::default()).unwrap();
        assert_eq!(none.roi_pct, 0.0);
        assert_eq!(none.net_benefit, 0.0);
    }
}

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Number of model features carried by every reading.
pub const FEATURE_COUNT: usize = 7;

/// Fixed feature order used by every transform, snapshot and drift report.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "global_active_power_kw",
    "global_reactive_power_kw",
    "voltage_v",
    "global_intensity_a",
    "sub_metering_1_wh",
    "sub_metering_2_wh",
    "sub_metering_3_wh",
];

/// Raw feature vector; `None` marks a missing measurement.
pub type FeatureRow = [Option<f64>; FEATURE_COUNT];

/// A row of `power_consumption`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub id: i64,
    #[schema(value_type = String, example = "2006-12-16T17:24:00")]
    pub ts: NaiveDateTime,
    pub global_active_power_kw: Option<f64>,
    pub global_reactive_power_kw: Option<f64>,
    pub voltage_v: Option<f64>,
    pub global_intensity_a: Option<f64>,
    pub sub_metering_1_wh: Option<f64>,
    pub sub_metering_2_wh: Option<f64>,
    pub sub_metering_3_wh: Option<f64>,
    pub anomaly_score: Option<f64>,
    pub is_anomaly: Option<bool>,
    pub scored_at: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn features(&self) -> FeatureRow {
        [
            self.global_active_power_kw,
            self.global_reactive_power_kw,
            self.voltage_v,
            self.global_intensity_a,
            self.sub_metering_1_wh,
            self.sub_metering_2_wh,
            self.sub_metering_3_wh,
        ]
    }

    /// A row is unscored until the scoring loop stamps `scored_at`.
    pub fn is_scored(&self) -> bool {
        self.scored_at.is_some()
    }
}

/// A reading as produced by ingestion, before it has an id or a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub ts: NaiveDateTime,
    pub global_active_power_kw: Option<f64>,
    pub global_reactive_power_kw: Option<f64>,
    pub voltage_v: Option<f64>,
    pub global_intensity_a: Option<f64>,
    pub sub_metering_1_wh: Option<f64>,
    pub sub_metering_2_wh: Option<f64>,
    pub sub_metering_3_wh: Option<f64>,
}

impl NewReading {
    pub fn from_features(ts: NaiveDateTime, f: FeatureRow) -> Self {
        Self {
            ts,
            global_active_power_kw: f[0],
            global_reactive_power_kw: f[1],
            voltage_v: f[2],
            global_intensity_a: f[3],
            sub_metering_1_wh: f[4],
            sub_metering_2_wh: f[5],
            sub_metering_3_wh: f[6],
        }
    }

    pub fn features(&self) -> FeatureRow {
        [
            self.global_active_power_kw,
            self.global_reactive_power_kw,
            self.voltage_v,
            self.global_intensity_a,
            self.sub_metering_1_wh,
            self.sub_metering_2_wh,
            self.sub_metering_3_wh,
        ]
    }

    /// Materialise as a stored row with the given id and no score.
    pub fn into_reading(self, id: i64) -> Reading {
        Reading {
            id,
            ts: self.ts,
            global_active_power_kw: self.global_active_power_kw,
            global_reactive_power_kw: self.global_reactive_power_kw,
            voltage_v: self.voltage_v,
            global_intensity_a: self.global_intensity_a,
            sub_metering_1_wh: self.sub_metering_1_wh,
            sub_metering_2_wh: self.sub_metering_2_wh,
            sub_metering_3_wh: self.sub_metering_3_wh,
            anomaly_score: None,
            is_anomaly: None,
            scored_at: None,
        }
    }
}

/// Score written back for one row by the scoring loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub id: i64,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}

/// Aggregates shown by `/api/stats`. Averages are 0.0 over an empty table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReadingStats {
    pub total_records: i64,
    pub total_anomalies: i64,
    pub avg_power: f64,
    pub max_power: f64,
    pub avg_voltage: f64,
}

/// Counts over scored rows, used for ROI estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoringSummary {
    pub scored: i64,
    pub anomalies: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2006, 12, 16)
            .unwrap()
            .and_hms_opt(17, 24, 0)
            .unwrap()
    }

    #[test]
    fn features_follow_column_order() {
        let f = [Some(4.2), Some(0.4), Some(234.8), Some(18.4), Some(0.0), Some(1.0), None];
        let r = NewReading::from_features(ts(), f);
        assert_eq!(r.features(), f);
        assert_eq!(r.voltage_v, Some(234.8));
        assert_eq!(r.sub_metering_3_wh, None);

        let stored = r.into_reading(7);
        assert_eq!(stored.id, 7);
        assert_eq!(stored.features(), f);
        assert!(!stored.is_scored());
    }

    #[test]
    fn column_names_are_unique() {
        let mut names = FEATURE_COLUMNS.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }
}

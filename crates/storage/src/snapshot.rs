use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use tracing::info;

use powerwatch_core::{Reading, FEATURE_COLUMNS};

use crate::error::StorageError;

/// Write readings as a CSV snapshot, one row per reading, header included.
pub fn write_snapshot(path: &Path, readings: &[Reading]) -> Result<usize, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for r in readings {
        writer.serialize(r)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", readings.len(), path.display());
    Ok(readings.len())
}

/// Numeric columns of a snapshot, keyed by header name.
///
/// Only the feature columns and `is_anomaly` are kept. Blank or unparsable
/// cells are dropped from their column, so column lengths can differ.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub rows: usize,
    pub columns: BTreeMap<String, Vec<f64>>,
    pub is_anomaly: Vec<bool>,
}

impl Snapshot {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Feature columns present in both snapshots, in feature order.
    pub fn shared_features(&self, other: &Snapshot) -> Vec<&'static str> {
        FEATURE_COLUMNS
            .iter()
            .copied()
            .filter(|c| self.columns.contains_key(*c) && other.columns.contains_key(*c))
            .collect()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// Read a snapshot written by [`write_snapshot`] or any CSV with matching headers.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, StorageError> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();

    let feature_idx: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            FEATURE_COLUMNS
                .iter()
                .find(|c| **c == h.trim())
                .map(|c| (i, *c))
        })
        .collect();
    let anomaly_idx = headers.iter().position(|h| h.trim() == "is_anomaly");

    let mut snapshot = Snapshot::default();
    for (_, name) in &feature_idx {
        snapshot.columns.insert(name.to_string(), Vec::new());
    }

    for record in reader.records() {
        let record = record?;
        snapshot.rows += 1;
        for (i, name) in &feature_idx {
            let value = record.get(*i).and_then(|v| v.trim().parse::<f64>().ok());
            if let (Some(v), Some(col)) = (value, snapshot.columns.get_mut(*name)) {
                if v.is_finite() {
                    col.push(v);
                }
            }
        }
        if let Some(flag) = anomaly_idx.and_then(|i| record.get(i)).and_then(parse_bool) {
            snapshot.is_anomaly.push(flag);
        }
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use powerwatch_core::NewReading;

    #[test]
    fn snapshot_keeps_feature_columns_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("baseline.csv");
        let ts = NaiveDate::from_ymd_opt(2006, 12, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let mut a = NewReading::from_features(ts, [Some(1.5), Some(0.1), Some(230.0), Some(6.0), Some(0.0), Some(1.0), Some(17.0)])
            .into_reading(1);
        a.is_anomaly = Some(true);
        let b = NewReading::from_features(ts, [Some(2.5), None, Some(232.0), Some(8.0), Some(0.0), Some(2.0), Some(18.0)])
            .into_reading(2);

        assert_eq!(write_snapshot(&path, &[a, b]).unwrap(), 2);
        let snap = read_snapshot(&path).unwrap();

        assert_eq!(snap.rows, 2);
        assert_eq!(snap.column("global_active_power_kw").unwrap(), &[1.5, 2.5]);
        assert_eq!(snap.column("global_reactive_power_kw").unwrap(), &[0.1]);
        assert_eq!(snap.is_anomaly, vec![true]);
        assert!(snap.column("id").is_none());
    }

    #[test]
    fn shared_features_only_lists_common_columns() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("left.csv");
        let right = dir.path().join("right.csv");
        std::fs::write(&left, "voltage_v,global_active_power_kw\n230,1.0\n").unwrap();
        std::fs::write(&right, "voltage_v,sub_metering_1_wh\n231,0\n").unwrap();

        let l = read_snapshot(&left).unwrap();
        let r = read_snapshot(&right).unwrap();
        assert_eq!(l.shared_features(&r), vec!["voltage_v"]);
    }
}

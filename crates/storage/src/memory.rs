use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::RwLock;

use powerwatch_core::{NewReading, Reading, ReadingStats, ScoreUpdate, ScoringSummary};

use crate::error::StorageError;
use crate::store::ReadingStore;

/// In-process [`ReadingStore`] with the same ordering and filtering rules as
/// the PostgreSQL store. Used by tests and local demos.
#[derive(Default)]
pub struct MemoryReadingStore {
    rows: RwLock<Vec<Reading>>,
    /// Number of upcoming writes (inserts or score batches) that fail untouched.
    fail_writes: AtomicUsize,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail, leaving rows untouched.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> Result<(), StorageError> {
        let pending = self.fail_writes.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_writes.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::Other("injected write failure".into()));
        }
        Ok(())
    }

    /// Snapshot of every row in insertion order.
    pub async fn all(&self) -> Vec<Reading> {
        self.rows.read().await.clone()
    }

    /// Insert a fully-formed row (including scoring fields), assigning a fresh id.
    pub async fn insert_raw(&self, mut reading: Reading) -> i64 {
        let mut rows = self.rows.write().await;
        reading.id = rows.len() as i64 + 1;
        let id = reading.id;
        rows.push(reading);
        id
    }

    async fn filtered<F>(&self, limit: i64, keep: F, newest_first: bool) -> Vec<Reading>
    where
        F: Fn(&Reading) -> bool,
    {
        let rows = self.rows.read().await;
        let mut out: Vec<Reading> = rows.iter().filter(|r| keep(r)).cloned().collect();
        out.sort_by(|a, b| (a.ts, a.id).cmp(&(b.ts, b.id)));
        if newest_first {
            out.reverse();
        }
        out.truncate(limit.max(0) as usize);
        out
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn insert_reading(&self, reading: &NewReading) -> Result<i64, StorageError> {
        self.injected_failure()?;
        let mut rows = self.rows.write().await;
        let id = rows.len() as i64 + 1;
        rows.push(reading.clone().into_reading(id));
        Ok(id)
    }

    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, StorageError> {
        self.injected_failure()?;
        let mut rows = self.rows.write().await;
        for r in readings {
            let id = rows.len() as i64 + 1;
            rows.push(r.clone().into_reading(id));
        }
        Ok(readings.len() as u64)
    }

    async fn fetch_unscored(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        Ok(self.filtered(limit, |r| r.scored_at.is_none(), false).await)
    }

    async fn fetch_training(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        Ok(self
            .filtered(limit, |r| r.is_anomaly != Some(true), false)
            .await)
    }

    async fn fetch_clustering_sample(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        Ok(self
            .filtered(
                limit,
                |r| {
                    r.global_active_power_kw.is_some()
                        && r.voltage_v.is_some()
                        && r.global_intensity_a.is_some()
                },
                false,
            )
            .await)
    }

    async fn apply_scores(
        &self,
        updates: &[ScoreUpdate],
        scored_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        self.injected_failure()?;

        let mut rows = self.rows.write().await;
        let mut affected = 0u64;
        for u in updates {
            if let Some(row) = rows.iter_mut().find(|r| r.id == u.id) {
                row.anomaly_score = Some(u.anomaly_score);
                row.is_anomaly = Some(u.is_anomaly);
                row.scored_at = Some(scored_at);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        Ok(self.filtered(limit, |_| true, true).await)
    }

    async fn stats(&self) -> Result<ReadingStats, StorageError> {
        let rows = self.rows.read().await;
        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        let power: Vec<f64> = rows.iter().filter_map(|r| r.global_active_power_kw).collect();
        let voltage: Vec<f64> = rows.iter().filter_map(|r| r.voltage_v).collect();
        let max_power = power.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |m| m.max(v)))
        });

        Ok(ReadingStats {
            total_records: rows.len() as i64,
            total_anomalies: rows.iter().filter(|r| r.is_anomaly == Some(true)).count() as i64,
            avg_power: mean(power),
            max_power: max_power.unwrap_or(0.0),
            avg_voltage: mean(voltage),
        })
    }

    async fn recent_anomalies(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        let rows = self.rows.read().await;
        let mut out: Vec<Reading> = rows
            .iter()
            .filter(|r| r.is_anomaly == Some(true) && r.scored_at.is_some_and(|s| s >= since))
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.scored_at, b.id).cmp(&(a.scored_at, a.id)));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn fetch_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Reading>, StorageError> {
        Ok(self
            .filtered(i64::MAX, |r| r.ts >= start && r.ts <= end, false)
            .await)
    }

    async fn scoring_summary(&self) -> Result<ScoringSummary, StorageError> {
        let rows = self.rows.read().await;
        let scored: Vec<&Reading> = rows.iter().filter(|r| r.is_scored()).collect();
        Ok(ScoringSummary {
            scored: scored.len() as i64,
            anomalies: scored.iter().filter(|r| r.is_anomaly == Some(true)).count() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2006, 12, 16)
            .unwrap()
            .and_hms_opt(17, minute, 0)
            .unwrap()
    }

    fn reading(minute: u32, power: Option<f64>, voltage: Option<f64>) -> NewReading {
        NewReading::from_features(ts(minute), [power, Some(0.1), voltage, Some(10.0), None, None, None])
    }

    #[tokio::test]
    async fn stats_on_empty_store_are_zero() {
        let store = MemoryReadingStore::new();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats, ReadingStats::default());
    }

    #[tokio::test]
    async fn unscored_rows_come_back_oldest_first() {
        let store = MemoryReadingStore::new();
        store.insert_reading(&reading(30, Some(2.0), Some(230.0))).await.unwrap();
        store.insert_reading(&reading(10, Some(1.0), Some(231.0))).await.unwrap();
        store.insert_reading(&reading(20, Some(3.0), Some(232.0))).await.unwrap();

        let batch = store.fetch_unscored(2).await.unwrap();
        let minutes: Vec<NaiveDateTime> = batch.iter().map(|r| r.ts).collect();
        assert_eq!(minutes, vec![ts(10), ts(20)]);
    }

    #[tokio::test]
    async fn apply_scores_moves_rows_out_of_unscored() {
        let store = MemoryReadingStore::new();
        let a = store.insert_reading(&reading(1, Some(2.0), Some(230.0))).await.unwrap();
        let b = store.insert_reading(&reading(2, Some(9.0), Some(230.0))).await.unwrap();
        let now = Utc::now();

        let updates = [
            ScoreUpdate { id: a, anomaly_score: -0.4, is_anomaly: false },
            ScoreUpdate { id: b, anomaly_score: -0.8, is_anomaly: true },
        ];
        assert_eq!(store.apply_scores(&updates, now).await.unwrap(), 2);
        assert!(store.fetch_unscored(10).await.unwrap().is_empty());

        let summary = store.scoring_summary().await.unwrap();
        assert_eq!(summary, ScoringSummary { scored: 2, anomalies: 1 });

        let recent = store.recent_anomalies(now - Duration::minutes(1), 20).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, b);

        // Training excludes flagged rows.
        let training = store.fetch_training(10).await.unwrap();
        assert_eq!(training.len(), 1);
        assert_eq!(training[0].id, a);
    }

    #[tokio::test]
    async fn injected_failure_leaves_batch_unscored() {
        let store = MemoryReadingStore::new();
        let id = store.insert_reading(&reading(1, Some(2.0), Some(230.0))).await.unwrap();
        store.fail_next_writes(1);

        let update = [ScoreUpdate { id, anomaly_score: -0.5, is_anomaly: false }];
        assert!(store.apply_scores(&update, Utc::now()).await.is_err());
        assert_eq!(store.fetch_unscored(10).await.unwrap().len(), 1);

        assert_eq!(store.apply_scores(&update, Utc::now()).await.unwrap(), 1);
        assert!(store.fetch_unscored(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_ignore_missing_values() {
        let store = MemoryReadingStore::new();
        store.insert_reading(&reading(1, Some(2.0), Some(230.0))).await.unwrap();
        store.insert_reading(&reading(2, Some(4.0), None)).await.unwrap();
        store.insert_reading(&reading(3, None, Some(240.0))).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.total_anomalies, 0);
        assert!((stats.avg_power - 3.0).abs() < 1e-12);
        assert!((stats.max_power - 4.0).abs() < 1e-12);
        assert!((stats.avg_voltage - 235.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn window_and_clustering_filters() {
        let store = MemoryReadingStore::new();
        store.insert_reading(&reading(1, Some(2.0), Some(230.0))).await.unwrap();
        store.insert_reading(&reading(5, None, Some(230.0))).await.unwrap();
        store.insert_reading(&reading(9, Some(2.5), Some(229.0))).await.unwrap();

        let window = store.fetch_window(ts(2), ts(9)).await.unwrap();
        assert_eq!(window.len(), 2);

        let sample = store.fetch_clustering_sample(10).await.unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|r| r.global_active_power_kw.is_some()));

        let latest = store.latest(1).await.unwrap();
        assert_eq!(latest[0].ts, ts(9));
    }
}

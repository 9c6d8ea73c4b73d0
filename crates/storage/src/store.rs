use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use powerwatch_core::{NewReading, Reading, ReadingStats, ScoreUpdate, ScoringSummary};

use crate::error::StorageError;

/// Access to the `power_consumption` table.
///
/// Every job in the pipeline talks to the table through this trait so the
/// scoring loop, training jobs and dashboard can run against PostgreSQL in
/// production and [`crate::MemoryReadingStore`] in tests.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert one reading, returning its id.
    async fn insert_reading(&self, reading: &NewReading) -> Result<i64, StorageError>;

    /// Insert many readings in one transaction. Returns rows inserted.
    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, StorageError>;

    /// Up to `limit` rows with `scored_at IS NULL`, oldest `ts` first.
    async fn fetch_unscored(&self, limit: i64) -> Result<Vec<Reading>, StorageError>;

    /// Historical rows not flagged as anomalous, oldest first.
    async fn fetch_training(&self, limit: i64) -> Result<Vec<Reading>, StorageError>;

    /// Rows with non-null power, voltage and intensity, oldest first.
    async fn fetch_clustering_sample(&self, limit: i64) -> Result<Vec<Reading>, StorageError>;

    /// Write scores for one batch atomically: either every update lands with
    /// `scored_at` set, or none does.
    async fn apply_scores(
        &self,
        updates: &[ScoreUpdate],
        scored_at: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Latest rows by `ts` descending.
    async fn latest(&self, limit: i64) -> Result<Vec<Reading>, StorageError>;

    async fn stats(&self) -> Result<ReadingStats, StorageError>;

    /// Anomalous rows scored at or after `since`, newest `scored_at` first.
    async fn recent_anomalies(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError>;

    /// Rows with `start <= ts <= end`, ordered by `ts`.
    async fn fetch_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Reading>, StorageError>;

    /// Scored and anomalous row counts.
    async fn scoring_summary(&self) -> Result<ScoringSummary, StorageError>;
}

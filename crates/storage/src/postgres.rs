use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use powerwatch_core::config::PostgresConfig;
use powerwatch_core::{NewReading, Reading, ReadingStats, ScoreUpdate, ScoringSummary};

use crate::error::StorageError;
use crate::store::ReadingStore;

const READING_COLUMNS: &str = "id, ts, global_active_power_kw, global_reactive_power_kw, voltage_v, \
     global_intensity_a, sub_metering_1_wh, sub_metering_2_wh, sub_metering_3_wh, \
     anomaly_score, is_anomaly, scored_at";

const INSERT_READING: &str = "INSERT INTO power_consumption (ts, global_active_power_kw, \
     global_reactive_power_kw, voltage_v, global_intensity_a, sub_metering_1_wh, \
     sub_metering_2_wh, sub_metering_3_wh) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id";

/// Create a PostgreSQL connection pool and run migrations.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.connection_string())
        .await?;
    info!("PostgreSQL connected: {}:{}/{}", config.host, config.port, config.database);

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn reading_from_row(row: &PgRow) -> Result<Reading, sqlx::Error> {
    Ok(Reading {
        id: row.try_get("id")?,
        ts: row.try_get("ts")?,
        global_active_power_kw: row.try_get("global_active_power_kw")?,
        global_reactive_power_kw: row.try_get("global_reactive_power_kw")?,
        voltage_v: row.try_get("voltage_v")?,
        global_intensity_a: row.try_get("global_intensity_a")?,
        sub_metering_1_wh: row.try_get("sub_metering_1_wh")?,
        sub_metering_2_wh: row.try_get("sub_metering_2_wh")?,
        sub_metering_3_wh: row.try_get("sub_metering_3_wh")?,
        anomaly_score: row.try_get("anomaly_score")?,
        is_anomaly: row.try_get("is_anomaly")?,
        scored_at: row.try_get("scored_at")?,
    })
}

fn readings_from_rows(rows: &[PgRow]) -> Result<Vec<Reading>, StorageError> {
    rows.iter()
        .map(|r| reading_from_row(r).map_err(StorageError::from))
        .collect()
}

/// [`ReadingStore`] backed by the `power_consumption` table.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, migrate and wrap the pool.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        Ok(Self::new(init_pg_pool(config).await?))
    }

    async fn select(&self, clause: &str, limit: i64) -> Result<Vec<Reading>, StorageError> {
        let sql = format!("SELECT {READING_COLUMNS} FROM power_consumption {clause} LIMIT $1");
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        readings_from_rows(&rows)
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert_reading(&self, r: &NewReading) -> Result<i64, StorageError> {
        let id: i64 = sqlx::query_scalar(INSERT_READING)
            .bind(r.ts)
            .bind(r.global_active_power_kw)
            .bind(r.global_reactive_power_kw)
            .bind(r.voltage_v)
            .bind(r.global_intensity_a)
            .bind(r.sub_metering_1_wh)
            .bind(r.sub_metering_2_wh)
            .bind(r.sub_metering_3_wh)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        for r in readings {
            sqlx::query(INSERT_READING)
                .bind(r.ts)
                .bind(r.global_active_power_kw)
                .bind(r.global_reactive_power_kw)
                .bind(r.voltage_v)
                .bind(r.global_intensity_a)
                .bind(r.sub_metering_1_wh)
                .bind(r.sub_metering_2_wh)
                .bind(r.sub_metering_3_wh)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(readings.len() as u64)
    }

    async fn fetch_unscored(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        self.select("WHERE scored_at IS NULL ORDER BY ts ASC, id ASC", limit)
            .await
    }

    async fn fetch_training(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        self.select(
            "WHERE is_anomaly IS NULL OR is_anomaly = FALSE ORDER BY ts ASC, id ASC",
            limit,
        )
        .await
    }

    async fn fetch_clustering_sample(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        self.select(
            "WHERE global_active_power_kw IS NOT NULL \
             AND voltage_v IS NOT NULL \
             AND global_intensity_a IS NOT NULL \
             ORDER BY ts ASC, id ASC",
            limit,
        )
        .await
    }

    async fn apply_scores(
        &self,
        updates: &[ScoreUpdate],
        scored_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        // Dropping the transaction on an early return rolls the batch back.
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for u in updates {
            let result = sqlx::query(
                "UPDATE power_consumption \
                 SET anomaly_score = $1, is_anomaly = $2, scored_at = $3 \
                 WHERE id = $4",
            )
            .bind(u.anomaly_score)
            .bind(u.is_anomaly)
            .bind(scored_at)
            .bind(u.id)
            .execute(&mut *tx)
            .await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        debug!(rows = affected, "score batch committed");
        Ok(affected)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        self.select("ORDER BY ts DESC, id DESC", limit).await
    }

    async fn stats(&self) -> Result<ReadingStats, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_records, \
             COUNT(*) FILTER (WHERE is_anomaly = TRUE) AS total_anomalies, \
             AVG(global_active_power_kw) AS avg_power, \
             MAX(global_active_power_kw) AS max_power, \
             AVG(voltage_v) AS avg_voltage \
             FROM power_consumption",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ReadingStats {
            total_records: row.try_get("total_records")?,
            total_anomalies: row.try_get("total_anomalies")?,
            avg_power: row.try_get::<Option<f64>, _>("avg_power")?.unwrap_or(0.0),
            max_power: row.try_get::<Option<f64>, _>("max_power")?.unwrap_or(0.0),
            avg_voltage: row.try_get::<Option<f64>, _>("avg_voltage")?.unwrap_or(0.0),
        })
    }

    async fn recent_anomalies(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM power_consumption \
             WHERE is_anomaly = TRUE AND scored_at IS NOT NULL AND scored_at >= $1 \
             ORDER BY scored_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        readings_from_rows(&rows)
    }

    async fn fetch_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Reading>, StorageError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM power_consumption \
             WHERE ts >= $1 AND ts <= $2 ORDER BY ts ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        readings_from_rows(&rows)
    }

    async fn scoring_summary(&self) -> Result<ScoringSummary, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS scored, \
             COUNT(*) FILTER (WHERE is_anomaly = TRUE) AS anomalies \
             FROM power_consumption WHERE scored_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ScoringSummary {
            scored: row.try_get("scored")?,
            anomalies: row.try_get("anomalies")?,
        })
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use powerwatch_core::config::{RoiConfig, ScoringConfig};
use powerwatch_storage::ReadingStore;

use crate::error::ComputeError;
use crate::roi::RoiReport;

use super::engine::ScoringEngine;
use super::metrics::ScoringMetrics;

/// What a single scoring cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No unscored rows were waiting.
    Idle,
    Scored { processed: usize, anomalies: usize },
}

/// Stops a running [`ScoringRunner`], interrupting its sleep.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("Scoring loop shutdown requested");
        self.flag.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a runner that is not yet waiting still wakes.
        self.wake.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Polls the store for unscored rows, scores them and writes the results back.
pub struct ScoringRunner {
    store: Arc<dyn ReadingStore>,
    engine: ScoringEngine,
    config: ScoringConfig,
    roi: RoiConfig,
    metrics: Arc<RwLock<ScoringMetrics>>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ScoringRunner {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        engine: ScoringEngine,
        config: ScoringConfig,
        roi: RoiConfig,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            roi,
            metrics: Arc::new(RwLock::new(ScoringMetrics::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            wake: Arc::clone(&self.wake),
        }
    }

    /// Get a snapshot of the current counters.
    pub fn metrics(&self) -> ScoringMetrics {
        self.metrics.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// Current ROI estimate from the loop's own counters.
    pub fn roi_report(&self) -> Option<RoiReport> {
        let m = self.metrics();
        RoiReport::compute(m.processed, m.anomalies, &self.roi)
    }

    /// Run exactly one cycle: fetch, transform, score, write back.
    ///
    /// A failed write rolls the whole batch back; the rows stay unscored and
    /// are picked up again by the next cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ComputeError> {
        let outcome = self.score_next_batch().await;

        if let Ok(mut m) = self.metrics.write() {
            match &outcome {
                Ok(CycleOutcome::Idle) => m.record_empty(),
                Ok(CycleOutcome::Scored { processed, anomalies }) => {
                    m.record_batch(*processed as u64, *anomalies as u64)
                }
                Err(_) => m.record_failure(),
            }
        }

        if let Ok(CycleOutcome::Scored { .. }) = outcome {
            let m = self.metrics();
            let every = self.config.roi_every_cycles.max(1);
            if m.productive_cycles % every == 0 {
                if let Some(report) = RoiReport::compute(m.processed, m.anomalies, &self.roi) {
                    report.log();
                }
            }
        }

        outcome
    }

    async fn score_next_batch(&self) -> Result<CycleOutcome, ComputeError> {
        let batch = self.store.fetch_unscored(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(CycleOutcome::Idle);
        }

        let updates = self.engine.score(&batch)?;
        let anomalies = updates.iter().filter(|u| u.is_anomaly).count();
        self.store.apply_scores(&updates, Utc::now()).await?;

        info!(
            "Scored {} rows -> {} anomalies (threshold {:.4})",
            updates.len(),
            anomalies,
            self.engine.threshold()
        );
        Ok(CycleOutcome::Scored {
            processed: updates.len(),
            anomalies,
        })
    }

    /// Run the polling loop. Returns when shutdown is signaled.
    pub async fn run(&self) -> ScoringMetrics {
        info!(
            "Scoring loop started: batch_size={}, interval={}s",
            self.config.batch_size, self.config.poll_interval_secs
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.run_cycle().await {
                Ok(CycleOutcome::Idle) => debug!("No unscored rows, waiting"),
                Ok(CycleOutcome::Scored { .. }) => {}
                Err(e) => error!("Scoring cycle failed, batch rolled back: {}", e),
            }

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = self.wake.notified() => {}
            }
        }

        let m = self.metrics();
        info!(
            "Scoring loop stopped: cycles={}, processed={}, anomalies={}, failed_batches={}",
            m.cycles, m.processed, m.anomalies, m.failed_batches
        );
        if let Some(report) = self.roi_report() {
            report.log();
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use powerwatch_core::NewReading;
    use powerwatch_storage::MemoryReadingStore;

    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::testing::{seed_normal_readings, test_model_config};
    use crate::training::train;

    async fn trained_runner(
        batch_size: i64,
        rows: usize,
    ) -> (Arc<MemoryReadingStore>, ScoringRunner, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let mem = Arc::new(MemoryReadingStore::new());
        seed_normal_readings(mem.as_ref(), rows, 42).await;
        train(mem.as_ref(), &artifacts, &test_model_config()).await.unwrap();

        let engine = ScoringEngine::load(&artifacts).unwrap();
        let store: Arc<dyn ReadingStore> = mem.clone();
        let config = ScoringConfig {
            batch_size,
            poll_interval_secs: 3600,
            roi_every_cycles: 5,
        };
        let runner = ScoringRunner::new(store, engine, config, RoiConfig::default());
        (mem, runner, dir)
    }

    fn spike() -> NewReading {
        let ts = NaiveDate::from_ymd_opt(2007, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        NewReading::from_features(
            ts,
            [Some(50.0), Some(0.2), Some(400.0), Some(10.0), Some(0.0), Some(1.0), Some(10.0)],
        )
    }

    #[tokio::test]
    async fn one_cycle_scores_every_pending_row() {
        let (mem, runner, _dir) = trained_runner(500, 100).await;
        let spike_id = mem.insert_reading(&spike()).await.unwrap();

        let outcome = runner.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Scored { processed: 101, .. }));

        let threshold = runner.engine.threshold();
        for row in mem.all().await {
            let score = row.anomaly_score.expect("score written");
            assert!(row.scored_at.is_some());
            assert_eq!(row.is_anomaly, Some(score < threshold));
        }

        let spike_row = mem.all().await.into_iter().find(|r| r.id == spike_id).unwrap();
        assert_eq!(spike_row.is_anomaly, Some(true));
        assert!(spike_row.anomaly_score.unwrap() < threshold);
    }

    #[tokio::test]
    async fn batches_respect_size_and_timestamp_order() {
        let (mem, runner, _dir) = trained_runner(30, 80).await;

        runner.run_cycle().await.unwrap();
        let pending = mem.fetch_unscored(1000).await.unwrap();
        assert_eq!(pending.len(), 50);

        let newest_scored = mem
            .all()
            .await
            .into_iter()
            .filter(|r| r.is_scored())
            .map(|r| r.ts)
            .max()
            .unwrap();
        assert!(pending.iter().all(|r| r.ts > newest_scored));

        runner.run_cycle().await.unwrap();
        runner.run_cycle().await.unwrap();
        assert_eq!(runner.run_cycle().await.unwrap(), CycleOutcome::Idle);

        let m = runner.metrics();
        assert_eq!(m.processed, 80);
        assert_eq!(m.productive_cycles, 3);
        assert_eq!(m.cycles, 4);
    }

    #[tokio::test]
    async fn failed_write_rolls_back_and_next_cycle_recovers() {
        let (mem, runner, _dir) = trained_runner(500, 40).await;
        mem.fail_next_writes(1);

        assert!(runner.run_cycle().await.is_err());
        assert_eq!(mem.fetch_unscored(1000).await.unwrap().len(), 40);
        assert_eq!(runner.metrics().failed_batches, 1);

        let outcome = runner.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Scored { processed: 40, .. }));
        assert!(mem.fetch_unscored(1000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_sleep() {
        let (_mem, runner, _dir) = trained_runner(500, 30).await;
        let runner = Arc::new(runner);
        let handle = runner.shutdown_handle();

        let task = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run().await })
        };

        // Let the first cycle finish, then stop while the loop sleeps for an hour.
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown();

        let metrics = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("runner should stop promptly")
            .unwrap();
        assert!(handle.is_shutdown());
        assert_eq!(metrics.processed, 30);
    }

    #[tokio::test]
    async fn roi_follows_loop_counters() {
        let (_mem, runner, _dir) = trained_runner(500, 50).await;
        assert!(runner.roi_report().is_none());
        runner.run_cycle().await.unwrap();
        let report = runner.roi_report().unwrap();
        assert_eq!(report.total_processed, 50);
    }
}

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use powerwatch_core::NewReading;
use powerwatch_storage::ReadingStore;

use crate::error::IngestError;

/// Rows buffered between the blocking reader and the insert loop.
const READ_AHEAD: usize = 256;

pub type RowReceiver = mpsc::Receiver<Result<NewReading, IngestError>>;

/// Drain a blocking row source (file reader, generator) on the blocking pool
/// and hand rows over a bounded channel. The reader stops once the receiver
/// is dropped.
pub fn spawn_reader<I>(source: I) -> RowReceiver
where
    I: IntoIterator<Item = Result<NewReading, IngestError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(READ_AHEAD);
    tokio::task::spawn_blocking(move || {
        for row in source {
            if tx.blocking_send(row).is_err() {
                debug!("Row receiver closed, reader stopping");
                break;
            }
        }
    });
    rx
}

#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Pause after each insert to simulate a live feed.
    pub delay: Duration,
    /// Stop after this many inserted rows.
    pub limit: Option<usize>,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2000),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub inserted: u64,
    /// Lines rejected before reaching the store.
    pub skipped: u64,
    /// Inserts the store refused.
    pub errors: u64,
    /// Whether the run ended on the stop signal rather than end of input.
    pub interrupted: bool,
}

/// Replays readings into the store one insert at a time.
pub struct Producer {
    options: ProducerOptions,
}

impl Producer {
    pub fn new(options: ProducerOptions) -> Self {
        Self { options }
    }

    /// Insert every row from `rows` until the channel closes, the limit is
    /// reached, or `shutdown` completes. The shutdown future is only polled
    /// while waiting between inserts.
    pub async fn run<F>(&self, store: &dyn ReadingStore, mut rows: RowReceiver, shutdown: F) -> ProducerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = ProducerStats::default();
        let limit_reached = |stats: &ProducerStats| {
            self.options.limit.is_some_and(|l| stats.inserted as usize >= l)
        };

        while !limit_reached(&stats) {
            let Some(row) = rows.recv().await else {
                break;
            };

            let reading = match row {
                Ok(r) => r,
                Err(e) => {
                    stats.skipped += 1;
                    debug!("Skipping line: {}", e);
                    continue;
                }
            };

            match store.insert_reading(&reading).await {
                Ok(id) => {
                    stats.inserted += 1;
                    info!("Inserted #{} @ {}", id, reading.ts);
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!("Insert failed @ {}: {}", reading.ts, e);
                }
            }

            if limit_reached(&stats) {
                info!("Row limit reached");
                break;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stop requested");
                    stats.interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(self.options.delay) => {}
            }
        }

        info!(
            "Producer finished: inserted={}, skipped={}, errors={}",
            stats.inserted, stats.skipped, stats.errors
        );
        stats
    }
}

//! Ingestion of finished log records
//!
//! Every submitted record is fanned out to two batch sinks: the database sink,
//! which creates the job the relay later claims, and, when a keyword is
//! configured, a print sink for records mentioning it.
//!
//! ```text
//! submit -> records -+-> batch -> DbSink
//!                    +-> filter(keyword) -> batch -> PrintSink
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::batch::batched;
use super::filter::filtered;
use super::sinks::{DbSink, PrintSink};
use crate::domain::{JobStore, NewLogJob};

#[derive(Debug, Clone)]
pub struct IntakeOptions {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Records whose message mentions this keyword are also printed.
    pub keyword: Option<String>,
    /// Initial `attempts_left` of every created job.
    pub retry_budget: i32,
}

/// Cheap handle used by callers to hand records to the intake.
#[derive(Clone)]
pub struct LogIngestor {
    tx: mpsc::Sender<NewLogJob>,
}

impl LogIngestor {
    /// Queue `record` for storage.
    ///
    /// Waits while the intake queue is full. Returns `false` if the record
    /// was dropped because `ct` fired or the intake has shut down.
    pub async fn submit(&self, ct: &CancellationToken, record: NewLogJob) -> bool {
        if ct.is_cancelled() {
            tracing::warn!(
                "⚠️ Pipeline cancelled, dropping log record for {} {}",
                record.method,
                record.url
            );
            return false;
        }

        tokio::select! {
            biased;
            _ = ct.cancelled() => {
                tracing::warn!("⚠️ Pipeline cancelled while queueing log record, dropping it");
                false
            }
            res = self.tx.send(record) => match res {
                Ok(()) => true,
                Err(mpsc::error::SendError(record)) => {
                    tracing::warn!(
                        "⚠️ Log intake closed, dropping log record for {} {}",
                        record.method,
                        record.url
                    );
                    false
                }
            },
        }
    }
}

/// Start the intake graph.
///
/// The returned task resolves once every [`LogIngestor`] clone is dropped and
/// both sinks have flushed; its value is the number of jobs created.
pub fn spawn_intake<W>(
    store: Arc<dyn JobStore>,
    writer: W,
    options: IntakeOptions,
) -> (LogIngestor, JoinHandle<usize>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
    let task = tokio::spawn(run_intake(rx, store, writer, options));

    (LogIngestor { tx }, task)
}

async fn run_intake<W>(
    mut records: mpsc::Receiver<NewLogJob>,
    store: Arc<dyn JobStore>,
    writer: W,
    options: IntakeOptions,
) -> usize
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let capacity = options.queue_capacity.max(1);

    let (db_tx, db_rx) = mpsc::channel(capacity);
    let db_batches = batched(db_rx, options.batch_size, options.flush_interval);
    let db_task = tokio::spawn(DbSink::new(store, options.retry_budget).run(db_batches));

    let mut print_tx = None;
    let mut print_task = None;
    if let Some(keyword) = options.keyword.filter(|k| !k.is_empty()) {
        let (tx, rx) = mpsc::channel(capacity);
        let matching = filtered(rx, move |record: &NewLogJob| record.mentions(&keyword));
        let print_batches = batched(matching, options.batch_size, options.flush_interval);
        print_task = Some(tokio::spawn(PrintSink::new(writer).run(print_batches)));
        print_tx = Some(tx);
    }

    tracing::info!("📥 Log intake started");

    while let Some(record) = records.recv().await {
        if let Some(tx) = &print_tx {
            if tx.send(record.clone()).await.is_err() {
                tracing::warn!("⚠️ Print sink stopped, no longer printing log records");
                print_tx = None;
            }
        }
        if db_tx.send(record).await.is_err() {
            tracing::error!("❌ Database sink stopped, log intake shutting down");
            break;
        }
    }

    drop(db_tx);
    drop(print_tx);

    let stored = match db_task.await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!("❌ Database sink task failed: {}", e);
            0
        }
    };
    if let Some(task) = print_task {
        if let Err(e) = task.await {
            tracing::error!("❌ Print sink task failed: {}", e);
        }
    }

    tracing::info!("📥 Log intake finished, {} jobs stored", stored);
    stored
}

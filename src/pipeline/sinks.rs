//! Batch sinks for ingested log records

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::domain::{JobStore, NewLogJob};

/// Persists every record as a new job in `Created` status.
pub struct DbSink {
    store: Arc<dyn JobStore>,
    attempts_left: i32,
}

impl DbSink {
    /// `attempts_left` is the retry budget every new job starts with.
    pub fn new(store: Arc<dyn JobStore>, attempts_left: i32) -> Self {
        Self {
            store,
            attempts_left,
        }
    }

    /// Write batches until the queue closes. Returns the number of jobs created.
    pub async fn run(self, mut batches: mpsc::Receiver<Vec<NewLogJob>>) -> usize {
        let mut written = 0;

        while let Some(batch) = batches.recv().await {
            let size = batch.len();
            for record in batch {
                match self.store.create_job(record, self.attempts_left).await {
                    Ok(job) => {
                        written += 1;
                        tracing::debug!("📝 Log job #{} created", job.id);
                    }
                    Err(e) => tracing::error!("❌ Failed to store log record: {}", e),
                }
            }
            tracing::debug!("💾 Flushed batch of {} log records", size);
        }

        written
    }
}

/// Writes each record as one JSON line.
pub struct PrintSink<W> {
    writer: W,
}

impl<W> PrintSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Print batches until the queue closes, then hand the writer back.
    pub async fn run(mut self, mut batches: mpsc::Receiver<Vec<NewLogJob>>) -> W {
        while let Some(batch) = batches.recv().await {
            let mut out = Vec::new();
            for record in &batch {
                match serde_json::to_vec(record) {
                    Ok(line) => {
                        out.extend_from_slice(&line);
                        out.push(b'\n');
                    }
                    Err(e) => tracing::warn!("⚠️ Skipping unprintable log record: {}", e),
                }
            }

            if let Err(e) = self.writer.write_all(&out).await {
                tracing::error!("❌ Failed to print log batch: {}", e);
                continue;
            }
            if let Err(e) = self.writer.flush().await {
                tracing::error!("❌ Failed to flush log output: {}", e);
            }
        }

        self.writer
    }
}

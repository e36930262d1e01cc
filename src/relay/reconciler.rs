//! Turns delivery outcomes into job status writes
//!
//! All status writes of the relay go through this single task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::RelayError;
use crate::domain::{DeliveryOutcome, JobStatus, JobStore, LogJob};

pub(crate) struct Reconciler {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) confirmed: mpsc::Receiver<LogJob>,
    pub(crate) failed: mpsc::Receiver<LogJob>,
}

impl Reconciler {
    /// Apply outcomes until both queues are closed and empty.
    ///
    /// On cancellation both queues are closed and what they still buffer is
    /// reconciled before returning.
    pub(crate) async fn run(mut self, ct: CancellationToken) -> Result<(), RelayError> {
        tracing::info!("🔄 Reconciler started");

        let mut confirmed_open = true;
        let mut failed_open = true;
        let mut closing = false;

        while confirmed_open || failed_open {
            if !closing && ct.is_cancelled() {
                self.confirmed.close();
                self.failed.close();
                closing = true;
            }

            tokio::select! {
                biased;
                _ = ct.cancelled(), if !closing => continue,
                job = self.confirmed.recv(), if confirmed_open => match job {
                    Some(job) => self.apply(job, DeliveryOutcome::Confirmed).await?,
                    None => confirmed_open = false,
                },
                job = self.failed.recv(), if failed_open => match job {
                    Some(job) => self.apply(job, DeliveryOutcome::Failed).await?,
                    None => failed_open = false,
                },
            }
        }

        tracing::info!("🛑 Reconciler stopped");
        Ok(())
    }

    async fn apply(&self, job: LogJob, outcome: DeliveryOutcome) -> Result<(), RelayError> {
        let (status, attempts_left) = job.next_state(outcome);

        let updated = self
            .store
            .update_status(job.id, status, attempts_left)
            .await
            .inspect_err(|e| {
                tracing::error!("❌ Status write for log job {} failed: {}", job.id, e)
            })?;

        if !updated {
            tracing::debug!(
                "Log job {} missing or already final, {} ignored",
                job.id,
                status
            );
        } else if status == JobStatus::NoAttemptsLeft {
            tracing::warn!(
                "⚠️ Log job {} ran out of delivery attempts ({} {})",
                job.id,
                job.method,
                job.url
            );
        } else {
            tracing::debug!(
                "✅ Log job {} is now {} ({} attempts left)",
                job.id,
                status,
                attempts_left
            );
        }

        Ok(())
    }
}

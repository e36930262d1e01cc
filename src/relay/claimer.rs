//! Polls the job store and feeds claimed jobs to the shipper

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::RelayError;
use super::queue::send_or_cancel;
use crate::domain::{JobStore, LogJob};

pub(crate) struct Claimer {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) jobs: mpsc::Sender<LogJob>,
    pub(crate) poll_interval: Duration,
    pub(crate) batch_size: u64,
}

impl Claimer {
    /// Claim on every tick until cancelled. A store error ends the loop and
    /// is returned as-is; it is not retried here.
    pub(crate) async fn run(self, ct: CancellationToken) -> Result<(), RelayError> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "🔄 Claimer started (interval={:?}, batch_size={})",
            self.poll_interval,
            self.batch_size
        );

        loop {
            tokio::select! {
                biased;
                _ = ct.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let claimed = match self.store.claim_pending(self.batch_size).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!("❌ Claiming log jobs failed: {}", e);
                    return Err(e.into());
                }
            };

            if !claimed.is_empty() {
                tracing::debug!("⚙️ Claimed {} log jobs", claimed.len());
            }

            for job in claimed {
                if !send_or_cancel(&self.jobs, job, &ct).await {
                    // Unsent jobs stay Processing until the reclaim window passes
                    tracing::info!("🛑 Claimer stopping, shipper queue closed");
                    return Ok(());
                }
            }
        }

        tracing::info!("🛑 Claimer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainError, JobStatus, NewLogJob};
    use crate::infrastructure::InMemoryJobStore;

    fn record(i: i32) -> NewLogJob {
        NewLogJob {
            order_id: Some(i),
            admin_id: Some(1),
            message: format!("order {} accepted", i),
            url: format!("/api/orders/{}", i),
            method: "POST".to_string(),
            http_status: 201,
        }
    }

    #[tokio::test]
    async fn test_claimed_jobs_reach_the_queue() {
        let store = Arc::new(InMemoryJobStore::default());
        for i in 1..=3 {
            store.create_job(record(i), 1).await.unwrap();
        }
        let (tx, mut rx) = mpsc::channel(8);
        let ct = CancellationToken::new();
        let claimer = Claimer {
            store: store.clone(),
            jobs: tx,
            poll_interval: Duration::from_millis(10),
            batch_size: 2,
        };
        let task = tokio::spawn(claimer.run(ct.clone()));

        let mut ids = Vec::new();
        for _ in 0..3 {
            let job = rx.recv().await.unwrap();
            assert_eq!(job.status, JobStatus::Processing);
            ids.push(job.id);
        }
        assert_eq!(ids, vec![1, 2, 3]);

        ct.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_store_error_aborts_polling() {
        let store = Arc::new(InMemoryJobStore::default());
        store.set_fail_claims(true).await;
        let (tx, _rx) = mpsc::channel(8);
        let claimer = Claimer {
            store,
            jobs: tx,
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
        };

        let result = claimer.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(RelayError::Store(DomainError::Database(_)))
        ));
    }

    #[tokio::test]
    async fn test_closed_queue_stops_claimer() {
        let store = Arc::new(InMemoryJobStore::default());
        store.create_job(record(1), 1).await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let claimer = Claimer {
            store,
            jobs: tx,
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
        };

        assert!(claimer.run(CancellationToken::new()).await.is_ok());
    }
}

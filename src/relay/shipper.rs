//! Publishes claimed jobs to the broker

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::RelayError;
use super::queue::{recv_or_close, send_or_cancel};
use crate::broker::Broker;
use crate::domain::LogJob;

pub(crate) struct Shipper {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) topic: String,
    pub(crate) jobs: mpsc::Receiver<LogJob>,
    pub(crate) failed: mpsc::Sender<LogJob>,
    pub(crate) worker_count: usize,
    pub(crate) publish_timeout: Duration,
}

impl Shipper {
    /// Publish every job read from the queue, `worker_count` at a time.
    ///
    /// Jobs that could not be published go to the failed queue. A successful
    /// publish is not reported anywhere; the echo confirms it.
    pub(crate) async fn run(self, ct: CancellationToken) -> Result<(), RelayError> {
        let Shipper {
            broker,
            topic,
            jobs,
            failed,
            worker_count,
            publish_timeout,
        } = self;

        tracing::info!(
            "📤 Shipper started (topic={}, workers={})",
            topic,
            worker_count
        );

        let incoming = stream::unfold((jobs, ct.clone()), |(mut jobs, ct)| async move {
            recv_or_close(&mut jobs, &ct)
                .await
                .map(|job| (job, (jobs, ct)))
        });

        let broker = broker.as_ref();
        let topic = topic.as_str();
        let failed = &failed;
        let ct = &ct;
        incoming
            .for_each_concurrent(worker_count.max(1), move |job| async move {
                ship(broker, topic, publish_timeout, job, failed, ct).await;
            })
            .await;

        tracing::info!("🛑 Shipper stopped");
        Ok(())
    }
}

async fn ship(
    broker: &dyn Broker,
    topic: &str,
    publish_timeout: Duration,
    job: LogJob,
    failed: &mpsc::Sender<LogJob>,
    ct: &CancellationToken,
) {
    let key = job.id.to_string();

    let reason = match serde_json::to_vec(&job) {
        Ok(payload) => match timeout(publish_timeout, broker.publish(topic, &key, payload)).await {
            Ok(Ok(())) => {
                tracing::debug!("📤 Log job {} published", job.id);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("publish timed out after {:?}", publish_timeout),
        },
        Err(e) => format!("serialization failed: {}", e),
    };

    tracing::warn!("⚠️ Log job {} not delivered: {}", job.id, reason);
    let id = job.id;
    if !send_or_cancel(failed, job, ct).await {
        // Left in Processing; picked up again after the reclaim window
        tracing::debug!("Failure of log job {} not recorded, relay stopping", id);
    }
}

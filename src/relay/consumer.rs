//! Reads published jobs back from the broker as delivery confirmations

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::RelayError;
use super::queue::send_or_cancel;
use crate::broker::{Broker, BrokerError};
use crate::domain::LogJob;

pub(crate) struct EchoConsumer {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) topic: String,
    pub(crate) group: String,
    pub(crate) confirmed: mpsc::Sender<LogJob>,
}

impl EchoConsumer {
    pub(crate) async fn run(self, ct: CancellationToken) -> Result<(), RelayError> {
        let mut messages = self.broker.subscribe(&self.topic, &self.group).await?;

        tracing::info!(
            "📥 Echo consumer subscribed to '{}' (group={})",
            self.topic,
            self.group
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = ct.cancelled() => break,
                next = messages.next() => next,
            };

            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(e)) => {
                    tracing::error!("❌ Echo stream failed: {}", e);
                    return Err(e.into());
                }
                None => {
                    tracing::error!("❌ Echo stream for '{}' ended", self.topic);
                    return Err(BrokerError::Receive {
                        topic: self.topic.clone(),
                        message: "echo stream ended".to_string(),
                    }
                    .into());
                }
            };

            let job: LogJob = match serde_json::from_slice(&payload) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Skipping undecodable message on '{}': {}",
                        self.topic,
                        e
                    );
                    continue;
                }
            };

            tracing::debug!("📥 Echo received for log job {}", job.id);
            if !send_or_cancel(&self.confirmed, job, &ct).await {
                break;
            }
        }

        // Dropping the stream closes the subscription
        drop(messages);
        tracing::info!("🛑 Echo consumer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::broker::{InMemoryBroker, MessageStream};
    use crate::domain::{JobStatus, now_timestamp};
    use async_trait::async_trait;

    fn job(id: i32) -> LogJob {
        LogJob {
            id,
            order_id: None,
            admin_id: None,
            message: "login".to_string(),
            url: "/api/auth/login".to_string(),
            method: "POST".to_string(),
            http_status: 401,
            status: JobStatus::Processing,
            attempts_left: 1,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn consumer(broker: Arc<dyn Broker>) -> (EchoConsumer, mpsc::Receiver<LogJob>) {
        let (tx, rx) = mpsc::channel(8);
        let consumer = EchoConsumer {
            broker,
            topic: "logs".to_string(),
            group: "test-group".to_string(),
            confirmed: tx,
        };
        (consumer, rx)
    }

    #[tokio::test]
    async fn test_undecodable_message_is_skipped() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.inject("logs", "x", b"not json".to_vec());
        broker.inject("logs", "4", serde_json::to_vec(&job(4)).unwrap());

        let (consumer, mut confirmed) = consumer(broker);
        let ct = CancellationToken::new();
        let task = tokio::spawn(consumer.run(ct.clone()));

        let echoed = tokio::time::timeout(Duration::from_secs(1), confirmed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed.id, 4);

        ct.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    struct BrokenBroker;

    #[async_trait]
    impl Broker for BrokenBroker {
        async fn publish(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn subscribe(&self, topic: &str, _: &str) -> Result<MessageStream, BrokerError> {
            Err(BrokerError::Subscribe {
                topic: topic.to_string(),
                message: "stream not found".to_string(),
            })
        }
    }

    struct EndedBroker;

    #[async_trait]
    impl Broker for EndedBroker {
        async fn publish(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn subscribe(&self, _: &str, _: &str) -> Result<MessageStream, BrokerError> {
            Ok(futures::stream::empty::<Result<Vec<u8>, BrokerError>>().boxed())
        }
    }

    #[tokio::test]
    async fn test_ended_stream_is_an_error() {
        let (consumer, _confirmed) = consumer(Arc::new(EndedBroker));

        let result = consumer.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(RelayError::Broker(BrokerError::Receive { .. }))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_fatal() {
        let (consumer, _confirmed) = consumer(Arc::new(BrokenBroker));

        let result = consumer.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(RelayError::Broker(BrokerError::Subscribe { .. }))
        ));
    }
}

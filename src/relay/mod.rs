//! Relay of stored log jobs through the broker
//!
//! ```text
//! Claimer -> jobs -> Shipper -> broker -> EchoConsumer -> confirmed -+-> Reconciler -> store
//!                       +-------------------------------> failed ----+
//! ```
//!
//! A job is done only once it has been read back from the broker. A failed
//! publish and an echo that never arrives each consume one unit of the job's
//! retry budget.

mod claimer;
mod consumer;
mod error;
mod queue;
mod reconciler;
mod shipper;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, NatsBroker};
use crate::config::Config;
use crate::domain::JobStore;

use claimer::Claimer;
use consumer::EchoConsumer;
pub use error::RelayError;
use reconciler::Reconciler;
use shipper::Shipper;

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub topic: String,
    pub consumer_group: String,
    pub poll_interval: Duration,
    /// Maximum number of jobs claimed per poll.
    pub batch_size: u64,
    /// Capacity of each internal queue.
    pub queue_capacity: usize,
    /// Maximum number of publishes in flight.
    pub worker_count: usize,
    pub publish_timeout: Duration,
}

pub struct Relay {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    options: RelayOptions,
}

impl Relay {
    pub fn new(store: Arc<dyn JobStore>, broker: Arc<dyn Broker>, options: RelayOptions) -> Self {
        Self {
            store,
            broker,
            options,
        }
    }

    /// Run every relay stage until `ct` is cancelled or one stage exits.
    ///
    /// Any stage finishing stops the others. The first failure is returned
    /// once all of them have finished.
    pub async fn run(self, ct: CancellationToken) -> Result<(), RelayError> {
        let ct = ct.child_token();
        let capacity = self.options.queue_capacity.max(1);

        let (jobs_tx, jobs_rx) = mpsc::channel(capacity);
        let (confirmed_tx, confirmed_rx) = mpsc::channel(capacity);
        let (failed_tx, failed_rx) = mpsc::channel(capacity);

        let mut tasks: JoinSet<(&'static str, Result<(), RelayError>)> = JoinSet::new();
        let mut labels = HashMap::new();

        let claimer = Claimer {
            store: self.store.clone(),
            jobs: jobs_tx,
            poll_interval: self.options.poll_interval,
            batch_size: self.options.batch_size,
        };
        let id = tasks.spawn(labelled("claimer", claimer.run(ct.clone()))).id();
        labels.insert(id, "claimer");

        let shipper = Shipper {
            broker: self.broker.clone(),
            topic: self.options.topic.clone(),
            jobs: jobs_rx,
            failed: failed_tx,
            worker_count: self.options.worker_count,
            publish_timeout: self.options.publish_timeout,
        };
        let id = tasks.spawn(labelled("shipper", shipper.run(ct.clone()))).id();
        labels.insert(id, "shipper");

        let consumer = EchoConsumer {
            broker: self.broker.clone(),
            topic: self.options.topic.clone(),
            group: self.options.consumer_group.clone(),
            confirmed: confirmed_tx,
        };
        let id = tasks.spawn(labelled("echo consumer", consumer.run(ct.clone()))).id();
        labels.insert(id, "echo consumer");

        let reconciler = Reconciler {
            store: self.store.clone(),
            confirmed: confirmed_rx,
            failed: failed_rx,
        };
        let id = tasks.spawn(labelled("reconciler", reconciler.run(ct.clone()))).id();
        labels.insert(id, "reconciler");

        tracing::info!(
            "🚀 Relay running on topic '{}' (group={})",
            self.options.topic,
            self.options.consumer_group
        );

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let (task, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    let task = labels.get(&e.id()).copied().unwrap_or("relay stage");
                    let message = e.to_string();
                    (task, Err(RelayError::Task { task, message }))
                }
            };

            match result {
                Ok(()) if !ct.is_cancelled() => {
                    tracing::warn!("⚠️ Relay {} stopped on its own, shutting down", task);
                }
                Ok(()) => {}
                Err(e) => {
                    tracing::error!("❌ Relay {} failed: {}", task, e);
                    first_error.get_or_insert(e);
                }
            }

            ct.cancel();
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("🛑 Relay stopped");
                Ok(())
            }
        }
    }
}

async fn labelled<F>(task: &'static str, fut: F) -> (&'static str, Result<(), RelayError>)
where
    F: std::future::Future<Output = Result<(), RelayError>>,
{
    (task, fut.await)
}

/// Connect the broker and spawn the relay.
///
/// Returns `Ok(None)` without doing anything when no broker is configured.
pub async fn start_relay(
    config: &Config,
    store: Arc<dyn JobStore>,
    ct: CancellationToken,
) -> Result<Option<JoinHandle<Result<(), RelayError>>>, RelayError> {
    let Some(broker_config) = &config.broker else {
        tracing::info!("ℹ️ No broker configured, log jobs will not be relayed");
        return Ok(None);
    };

    let broker = NatsBroker::connect(&broker_config.host, broker_config.port).await?;
    let relay = Relay::new(store, Arc::new(broker), config.relay_options());

    Ok(Some(tokio::spawn(relay.run(ct))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::broker::{BrokerError, InMemoryBroker, MessageStream};
    use crate::domain::{JobStatus, NewLogJob};
    use crate::infrastructure::InMemoryJobStore;
    use async_trait::async_trait;
    use futures::{StreamExt, stream};

    fn options() -> RelayOptions {
        RelayOptions {
            topic: "logs".to_string(),
            consumer_group: "relay-test".to_string(),
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
            queue_capacity: 4,
            worker_count: 2,
            publish_timeout: Duration::from_secs(1),
        }
    }

    fn record(i: i32) -> NewLogJob {
        NewLogJob {
            order_id: Some(i),
            admin_id: Some(9),
            message: format!("parcel {} scanned", i),
            url: format!("/api/orders/{}/scan", i),
            method: "PUT".to_string(),
            http_status: 200,
        }
    }

    async fn wait_until_final(store: &InMemoryJobStore) -> Vec<crate::domain::LogJob> {
        for _ in 0..200 {
            let jobs = store.snapshot().await;
            if jobs.iter().all(|job| job.status.is_terminal()) {
                return jobs;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("jobs did not reach a final status");
    }

    #[tokio::test]
    async fn test_published_jobs_are_confirmed_by_echo() {
        let store = Arc::new(InMemoryJobStore::default());
        for i in 1..=10 {
            store.create_job(record(i), 3).await.unwrap();
        }
        let broker = Arc::new(InMemoryBroker::new());
        let ct = CancellationToken::new();
        let relay = Relay::new(store.clone(), broker.clone(), options());
        let handle = tokio::spawn(relay.run(ct.clone()));

        let jobs = wait_until_final(&store).await;

        assert!(jobs.iter().all(|job| job.status == JobStatus::Done));
        assert!(jobs.iter().all(|job| job.attempts_left == 3));
        assert_eq!(broker.published("logs").len(), 10);

        ct.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_claim_failure_stops_every_stage() {
        let store = Arc::new(InMemoryJobStore::default());
        store.set_fail_claims(true).await;
        let relay = Relay::new(store, Arc::new(InMemoryBroker::new()), options());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            relay.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(RelayError::Store(_))));
    }

    // Accepts every publish but never echoes anything back
    #[derive(Default)]
    struct SilentBroker {
        publishes: AtomicUsize,
        stream_ends: bool,
        subscribe_panics: bool,
    }

    #[async_trait]
    impl Broker for SilentBroker {
        async fn publish(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), BrokerError> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(&self, _: &str, _: &str) -> Result<MessageStream, BrokerError> {
            if self.subscribe_panics {
                panic!("subscription handler lost");
            }
            if self.stream_ends {
                Ok(stream::empty::<Result<Vec<u8>, BrokerError>>().boxed())
            } else {
                Ok(stream::pending::<Result<Vec<u8>, BrokerError>>().boxed())
            }
        }
    }

    #[tokio::test]
    async fn test_missing_echoes_exhaust_the_budget() {
        let store = Arc::new(InMemoryJobStore::new(Duration::ZERO));
        store.create_job(record(1), 1).await.unwrap();
        let broker = Arc::new(SilentBroker::default());
        let ct = CancellationToken::new();
        let relay = Relay::new(store.clone(), broker.clone(), options());
        let handle = tokio::spawn(relay.run(ct.clone()));

        let jobs = wait_until_final(&store).await;
        ct.cancel();
        assert!(handle.await.unwrap().is_ok());

        assert_eq!(jobs[0].status, JobStatus::NoAttemptsLeft);
        assert_eq!(jobs[0].attempts_left, 0);
        // First claim plus one reclaim, then the budget is gone
        assert_eq!(broker.publishes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ended_echo_stream_stops_the_relay() {
        let store = Arc::new(InMemoryJobStore::default());
        store.create_job(record(1), 1).await.unwrap();
        let broker = Arc::new(SilentBroker {
            stream_ends: true,
            ..Default::default()
        });
        let relay = Relay::new(store, broker, options());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            relay.run(CancellationToken::new()),
        )
        .await
        .expect("relay kept running after the echo stream ended");

        assert!(matches!(
            result,
            Err(RelayError::Broker(BrokerError::Receive { .. }))
        ));
    }

    #[tokio::test]
    async fn test_crashed_stage_is_reported_by_name() {
        let store = Arc::new(InMemoryJobStore::default());
        let broker = Arc::new(SilentBroker {
            subscribe_panics: true,
            ..Default::default()
        });
        let relay = Relay::new(store, broker, options());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            relay.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        match result {
            Err(RelayError::Task { task, .. }) => assert_eq!(task, "echo consumer"),
            other => panic!("unexpected relay result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_relay_without_broker_is_noop() {
        let config = Config::from_lookup(|_| None);
        let store = Arc::new(InMemoryJobStore::default());

        let handle = start_relay(&config, store, CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_none());
    }
}

//! NATS JetStream broker adapter
//!
//! A topic maps to a JetStream stream of the same name capturing the subject
//! of the same name. The message key travels in the `Log-Job-Key` header.

use std::collections::HashSet;

use async_nats::jetstream::{self, consumer::DeliverPolicy, consumer::pull};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use super::{Broker, BrokerError, MessageStream};

pub const KEY_HEADER: &str = "Log-Job-Key";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Idle durable consumers are removed by the server after this long.
const CONSUMER_INACTIVE_THRESHOLD: Duration = Duration::from_secs(300);

pub struct NatsBroker {
    jetstream: jetstream::Context,
    address: String,
    known_streams: Mutex<HashSet<String>>,
}

impl NatsBroker {
    /// Connect to the NATS server at `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, BrokerError> {
        let address = format!("nats://{}:{}", host, port);

        info!("🔄 Connecting to NATS server at: {}", address);

        let client = match timeout(CONNECT_TIMEOUT, async_nats::connect(address.as_str())).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return Err(BrokerError::Connect {
                    address,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(BrokerError::Connect {
                    address,
                    message: format!("timed out after {:?}", CONNECT_TIMEOUT),
                });
            }
        };

        info!("✅ Connected to NATS server successfully");

        Ok(Self {
            jetstream: jetstream::new(client),
            address,
            known_streams: Mutex::new(HashSet::new()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn stream(&self, topic: &str) -> Result<jetstream::stream::Stream, String> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: topic.to_string(),
                subjects: vec![topic.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| e.to_string())?;

        self.known_streams.lock().await.insert(topic.to_string());
        Ok(stream)
    }

    async fn ensure_stream(&self, topic: &str) -> Result<(), String> {
        if self.known_streams.lock().await.contains(topic) {
            return Ok(());
        }
        self.stream(topic).await.map(|_| ())
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let publish_error = |message: String| BrokerError::Publish {
            topic: topic.to_string(),
            message,
        };

        self.ensure_stream(topic).await.map_err(publish_error)?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(KEY_HEADER, key);

        let ack = self
            .jetstream
            .publish_with_headers(topic.to_string(), headers, payload.into())
            .await
            .map_err(|e| publish_error(e.to_string()))?;
        ack.await.map_err(|e| publish_error(e.to_string()))?;

        debug!("📤 Published message {} to NATS subject: {}", key, topic);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<MessageStream, BrokerError> {
        let subscribe_error = |message: String| BrokerError::Subscribe {
            topic: topic.to_string(),
            message,
        };

        let stream = self.stream(topic).await.map_err(subscribe_error)?;

        let consumer = stream
            .get_or_create_consumer(
                group,
                pull::Config {
                    durable_name: Some(group.to_string()),
                    // Replay from the beginning so every published job is echoed
                    deliver_policy: DeliverPolicy::All,
                    inactive_threshold: CONSUMER_INACTIVE_THRESHOLD,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| subscribe_error(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| subscribe_error(e.to_string()))?;

        info!(
            "📡 Subscribed to NATS stream '{}' as consumer '{}'",
            topic, group
        );

        let topic = topic.to_string();
        let payloads = messages.then(move |message| {
            let topic = topic.clone();
            async move {
                match message {
                    Ok(message) => {
                        if let Err(e) = message.ack().await {
                            warn!("⚠️ Failed to ack message on '{}': {}", topic, e);
                        }
                        Ok(message.payload.to_vec())
                    }
                    Err(e) => Err(BrokerError::Receive {
                        topic,
                        message: e.to_string(),
                    }),
                }
            }
        });

        Ok(payloads.boxed())
    }
}

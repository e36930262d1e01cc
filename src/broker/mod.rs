//! Message broker contract used by the relay
//!
//! The relay publishes each job to a topic and reads the same topic back from
//! its earliest message. Adapters: NATS JetStream for deployments, an
//! in-memory log for tests and local runs.

pub mod memory;
pub mod nats;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use memory::InMemoryBroker;
pub use nats::NatsBroker;

/// Errors reported by broker adapters.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("failed to connect to broker at {address}: {message}")]
    Connect { address: String, message: String },

    #[error("failed to publish to '{topic}': {message}")]
    Publish { topic: String, message: String },

    #[error("failed to subscribe to '{topic}': {message}")]
    Subscribe { topic: String, message: String },

    #[error("failed to receive from '{topic}': {message}")]
    Receive { topic: String, message: String },
}

/// Raw payloads read back from a topic, oldest first.
pub type MessageStream = BoxStream<'static, Result<Vec<u8>, BrokerError>>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish `payload` on `topic`; messages sharing a `key` keep their order.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Read `topic` from its earliest retained message under consumer `group`.
    ///
    /// Dropping the stream closes the subscription.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<MessageStream, BrokerError>;
}

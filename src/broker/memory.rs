//! In-memory broker with an append-only log per topic
//!
//! Every subscriber replays its topic from the first message, whatever its
//! group. Publish failures can be injected to exercise the retry path.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;

use super::{Broker, BrokerError, MessageStream};

/// One message as stored on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct InMemoryBroker {
    topics: DashMap<String, watch::Sender<Vec<BrokerRecord>>>,
    failing_publishes: AtomicUsize,
    failing_keys: DashMap<String, usize>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publishes fail, whatever their key.
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` publishes with `key` fail.
    pub fn fail_key(&self, key: &str, count: usize) {
        self.failing_keys.insert(key.to_string(), count);
    }

    /// Append a raw message, bypassing failure injection.
    pub fn inject(&self, topic: &str, key: &str, payload: Vec<u8>) {
        self.append(
            topic,
            BrokerRecord {
                key: key.to_string(),
                payload,
            },
        );
    }

    /// Every message published on `topic` so far.
    pub fn published(&self, topic: &str) -> Vec<BrokerRecord> {
        self.topics
            .get(topic)
            .map(|log| log.borrow().clone())
            .unwrap_or_default()
    }

    fn append(&self, topic: &str, record: BrokerRecord) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .send_modify(|log| log.push(record));
    }

    fn take_failure(&self, key: &str) -> bool {
        if self
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }

        match self.failing_keys.get_mut(key) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.take_failure(key) {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                message: "injected failure".to_string(),
            });
        }

        self.append(
            topic,
            BrokerRecord {
                key: key.to_string(),
                payload,
            },
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _group: &str) -> Result<MessageStream, BrokerError> {
        let log = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe();

        let messages = stream::unfold((log, 0usize), |(mut log, offset)| async move {
            loop {
                let next = log.borrow_and_update().get(offset).cloned();
                if let Some(record) = next {
                    return Some((Ok(record.payload), (log, offset + 1)));
                }
                // Topic removed: nothing more will arrive
                if log.changed().await.is_err() {
                    return None;
                }
            }
        });

        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_replays_from_earliest_then_follows() {
        let broker = InMemoryBroker::new();
        broker.publish("logs", "1", b"one".to_vec()).await.unwrap();
        broker.publish("logs", "2", b"two".to_vec()).await.unwrap();

        let mut messages = broker.subscribe("logs", "group-a").await.unwrap();
        assert_eq!(messages.next().await.unwrap().unwrap(), b"one");
        assert_eq!(messages.next().await.unwrap().unwrap(), b"two");

        broker.publish("logs", "3", b"three".to_vec()).await.unwrap();
        assert_eq!(messages.next().await.unwrap().unwrap(), b"three");
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(1);
        broker.fail_key("7", 2);

        assert!(broker.publish("logs", "1", vec![]).await.is_err());
        assert!(broker.publish("logs", "1", vec![]).await.is_ok());
        assert!(broker.publish("logs", "7", vec![]).await.is_err());
        assert!(broker.publish("logs", "7", vec![]).await.is_err());
        assert!(broker.publish("logs", "7", vec![]).await.is_ok());

        let keys: Vec<String> = broker.published("logs").into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["1", "7"]);
    }
}

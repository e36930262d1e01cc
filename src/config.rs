use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::IntakeOptions;
use crate::relay::RelayOptions;

/// Address of the message broker. Absent means the relay is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub broker: Option<BrokerConfig>,
    pub log_topic: String,
    pub consumer_group: String,
    pub poll_interval: Duration,
    pub relay_batch_size: u64,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub retry_budget: i32,
    pub reclaim_after: Duration,
    pub publish_timeout: Duration,
    pub sink_batch_size: usize,
    pub sink_flush_interval: Duration,
    /// Records mentioning this keyword are also printed to stdout.
    pub log_keyword: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let broker = lookup("BROKER_HOST")
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .map(|host| BrokerConfig {
                host,
                port: parse_or(&lookup, "BROKER_PORT", 4222),
            });

        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://pickup_audit.db?mode=rwc".to_string()),
            port: parse_or(&lookup, "PORT", 8000),
            broker,
            log_topic: lookup("LOG_TOPIC")
                .filter(|topic| !topic.trim().is_empty())
                .unwrap_or_else(|| "logs".to_string()),
            consumer_group: lookup("RELAY_CONSUMER_GROUP")
                .filter(|group| !group.trim().is_empty())
                .unwrap_or_else(|| format!("log-relay-{}", uuid::Uuid::new_v4())),
            poll_interval: Duration::from_millis(parse_or(&lookup, "RELAY_POLL_INTERVAL_MS", 1000)),
            relay_batch_size: parse_or(&lookup, "RELAY_BATCH_SIZE", 100),
            queue_capacity: parse_or(&lookup, "RELAY_QUEUE_CAPACITY", 256),
            worker_count: parse_or(&lookup, "RELAY_WORKER_COUNT", 4),
            retry_budget: parse_or(&lookup, "RELAY_RETRY_BUDGET", 3i32).max(0),
            reclaim_after: Duration::from_secs(parse_or(&lookup, "RELAY_RECLAIM_AFTER_SECS", 60)),
            publish_timeout: Duration::from_millis(parse_or(
                &lookup,
                "RELAY_PUBLISH_TIMEOUT_MS",
                5000,
            )),
            sink_batch_size: parse_or(&lookup, "SINK_BATCH_SIZE", 50),
            sink_flush_interval: Duration::from_millis(parse_or(
                &lookup,
                "SINK_FLUSH_INTERVAL_MS",
                1000,
            )),
            log_keyword: match lookup("LOG_KEYWORD") {
                Some(keyword) if keyword.trim().is_empty() => None,
                Some(keyword) => Some(keyword.trim().to_string()),
                None => Some("error".to_string()),
            },
        }
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            topic: self.log_topic.clone(),
            consumer_group: self.consumer_group.clone(),
            poll_interval: self.poll_interval,
            batch_size: self.relay_batch_size,
            queue_capacity: self.queue_capacity,
            worker_count: self.worker_count,
            publish_timeout: self.publish_timeout,
        }
    }

    pub fn intake_options(&self) -> IntakeOptions {
        IntakeOptions {
            queue_capacity: self.queue_capacity,
            batch_size: self.sink_batch_size,
            flush_interval: self.sink_flush_interval,
            keyword: self.log_keyword.clone(),
            retry_budget: self.retry_budget,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.database_url, "sqlite://pickup_audit.db?mode=rwc");
        assert_eq!(config.port, 8000);
        assert!(config.broker.is_none());
        assert_eq!(config.log_topic, "logs");
        assert!(config.consumer_group.starts_with("log-relay-"));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.relay_batch_size, 100);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.retry_budget, 3);
        assert_eq!(config.reclaim_after, Duration::from_secs(60));
        assert_eq!(config.publish_timeout, Duration::from_secs(5));
        assert_eq!(config.sink_batch_size, 50);
        assert_eq!(config.sink_flush_interval, Duration::from_secs(1));
        assert_eq!(config.log_keyword.as_deref(), Some("error"));
    }

    #[test]
    fn test_broker_and_overrides() {
        let config = config(&[
            ("BROKER_HOST", "nats.internal"),
            ("BROKER_PORT", "4333"),
            ("RELAY_CONSUMER_GROUP", "audit"),
            ("RELAY_RETRY_BUDGET", "5"),
            ("LOG_KEYWORD", ""),
        ]);
        assert_eq!(
            config.broker,
            Some(BrokerConfig {
                host: "nats.internal".to_string(),
                port: 4333,
            })
        );
        assert_eq!(config.relay_options().consumer_group, "audit");
        assert_eq!(config.intake_options().retry_budget, 5);
        assert!(config.log_keyword.is_none());
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = config(&[
            ("BROKER_HOST", "  "),
            ("PORT", "eighty"),
            ("RELAY_WORKER_COUNT", "-1"),
            ("RELAY_RETRY_BUDGET", "-4"),
        ]);
        assert!(config.broker.is_none());
        assert_eq!(config.port, 8000);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.retry_budget, 0);
    }

    #[test]
    fn test_consumer_group_is_unique_per_process_by_default() {
        assert_ne!(config(&[]).consumer_group, config(&[]).consumer_group);
    }
}

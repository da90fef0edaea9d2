use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::consumer::WorkerSettings;
use crate::error::{AppError, Result};
use crate::routing::{PartitionRouter, DEFAULT_CITIES};

#[derive(Debug, Clone)]
pub struct Config {
    /// KAFKA_* variables
    pub kafka: KafkaConfig,
    /// LEDGER_* variables
    pub ledger: LedgerConfig,
    /// DATABASE_* variables
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: String,
    /// Consumer group that owns the committed offsets
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_dlq_topic")]
    pub dlq_topic: String,
    /// Fixed for the lifetime of the deployment; one worker per partition
    #[serde(default = "default_partition_count")]
    pub partition_count: i32,
    /// Routing table, comma separated; position = partition
    #[serde(default = "default_partition_cities")]
    pub partition_cities: Vec<String>,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "ledger-consumer".to_string()
}

fn default_topic() -> String {
    "bank-transactions".to_string()
}

fn default_dlq_topic() -> String {
    "bank-transactions-dlq".to_string()
}

fn default_partition_count() -> i32 {
    4
}

fn default_partition_cities() -> Vec<String> {
    DEFAULT_CITIES.iter().map(|city| city.to_string()).collect()
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_max_batch_size() -> usize {
    500
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_max_connections() -> u32 {
    10
}

impl Config {
    /// Load from the process environment (and `.env` if present), then validate
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables, then validate
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let config = Config {
            kafka: envy::prefixed("KAFKA_").from_iter(vars.clone())?,
            ledger: envy::prefixed("LEDGER_").from_iter(vars.clone())?,
            database: envy::prefixed("DATABASE_").from_iter(vars)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;

        if ledger.partition_count <= 0 {
            return Err(AppError::Config(format!(
                "LEDGER_PARTITION_COUNT must be positive, got {}",
                ledger.partition_count
            )));
        }
        if ledger.partition_cities.len() > ledger.partition_count as usize {
            return Err(AppError::Config(format!(
                "{} cities configured for {} partitions",
                ledger.partition_cities.len(),
                ledger.partition_count
            )));
        }

        let mut seen = HashSet::new();
        for city in &ledger.partition_cities {
            if city.trim().is_empty() {
                return Err(AppError::Config(
                    "LEDGER_PARTITION_CITIES contains an empty city".to_string(),
                ));
            }
            if !seen.insert(city.as_str()) {
                return Err(AppError::Config(format!(
                    "city {} is mapped to more than one partition",
                    city
                )));
            }
        }

        if ledger.topic.is_empty() || ledger.dlq_topic.is_empty() {
            return Err(AppError::Config("topic names must not be empty".to_string()));
        }
        if ledger.topic == ledger.dlq_topic {
            return Err(AppError::Config(format!(
                "dead-letter topic must differ from the main topic ({})",
                ledger.topic
            )));
        }
        if ledger.max_batch_size == 0 {
            return Err(AppError::Config(
                "LEDGER_MAX_BATCH_SIZE must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn router(&self) -> PartitionRouter {
        PartitionRouter::new(self.ledger.partition_cities.iter().cloned())
    }

    pub fn partitions(&self) -> std::ops::Range<i32> {
        0..self.ledger.partition_count
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_timeout: Duration::from_millis(self.ledger.poll_timeout_ms),
            max_batch_size: self.ledger.max_batch_size,
            retry_backoff: Duration::from_millis(self.ledger.retry_backoff_ms),
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.publish_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(Vec::new()).unwrap();

        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.group_id, "ledger-consumer");
        assert_eq!(config.ledger.topic, "bank-transactions");
        assert_eq!(config.ledger.dlq_topic, "bank-transactions-dlq");
        assert_eq!(config.partitions(), 0..4);
        assert_eq!(config.database.url, None);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.worker_settings().poll_timeout, Duration::from_millis(100));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));

        let router = config.router();
        assert_eq!(router.route("Toronto"), 1);
        assert_eq!(router.route("Calgary"), 3);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092"),
            ("LEDGER_TOPIC", "tx"),
            ("LEDGER_DLQ_TOPIC", "tx-dlq"),
            ("LEDGER_PARTITION_COUNT", "3"),
            ("LEDGER_PARTITION_CITIES", "CityA,CityB"),
            ("LEDGER_RETRY_BACKOFF_MS", "250"),
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.kafka.brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(config.ledger.topic, "tx");
        assert_eq!(config.partitions(), 0..3);
        assert_eq!(config.router().route("CityB"), 1);
        assert_eq!(config.router().city_for_partition(2), "unknown");
        assert_eq!(
            config.worker_settings().retry_backoff,
            Duration::from_millis(250)
        );
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/ledger")
        );
    }

    #[test]
    fn test_rejects_invalid_layouts() {
        let cases = [
            vec![("LEDGER_PARTITION_COUNT", "0")],
            vec![
                ("LEDGER_PARTITION_COUNT", "1"),
                ("LEDGER_PARTITION_CITIES", "CityA,CityB"),
            ],
            vec![("LEDGER_PARTITION_CITIES", "CityA,CityA")],
            vec![("LEDGER_DLQ_TOPIC", "bank-transactions")],
            vec![("LEDGER_MAX_BATCH_SIZE", "0")],
        ];

        for case in cases {
            let result = Config::from_vars(vars(&case));
            assert!(
                matches!(result, Err(AppError::Config(_))),
                "expected config error for {case:?}"
            );
        }
    }

    #[test]
    fn test_unparseable_value() {
        let result = Config::from_vars(vars(&[("LEDGER_PARTITION_COUNT", "four")]));
        assert!(matches!(result, Err(AppError::Env(_))));
    }
}

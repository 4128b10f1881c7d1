use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::publisher::PublishMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub kafka: KafkaConfig,
    pub schema_registry_url: String,
    pub publish_timeout_ms: u64,
    pub sync_send: bool,
    pub max_batch_size: usize,
    pub max_batch_concurrency: usize,
}

/// Kafka connection and producer settings, fixed for the process lifetime.
#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    /// When false, messages go to an in-memory broker instead of Kafka.
    pub enabled: bool,
    /// Comma-separated bootstrap servers, e.g. "kafka1:9092,kafka2:9092"
    pub brokers: String,
    pub topic: String,
    pub retries: u32,
    pub max_in_flight: u32,
    pub delivery_timeout_ms: u64,
    pub ssl_enabled: bool,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 8080)?,
            kafka: KafkaConfig {
                enabled: parse_or("KAFKA_ENABLED", true)?,
                brokers: env::var("KAFKA_BOOTSTRAP_SERVERS")
                    .unwrap_or_else(|_| "localhost:9092".to_string()),
                topic: env::var("KAFKA_TOPIC_TRANSACTIONS")
                    .unwrap_or_else(|_| "transactions".to_string()),
                retries: parse_or("KAFKA_PRODUCER_RETRIES", 3)?,
                max_in_flight: parse_or("KAFKA_PRODUCER_MAX_IN_FLIGHT", 5)?,
                delivery_timeout_ms: parse_or("KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS", 120_000)?,
                ssl_enabled: parse_or("KAFKA_SSL_ENABLED", false)?,
                sasl_mechanism: env::var("KAFKA_SASL_MECHANISM").ok(),
                sasl_username: env::var("KAFKA_SASL_USERNAME").ok(),
                sasl_password: env::var("KAFKA_SASL_PASSWORD").ok(),
            },
            schema_registry_url: env::var("SCHEMA_REGISTRY_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            publish_timeout_ms: parse_or("KAFKA_PRODUCER_TIMEOUT_MS", 5_000)?,
            sync_send: parse_or("KAFKA_PRODUCER_SYNC_SEND", false)?,
            max_batch_size: parse_or("MAX_BATCH_SIZE", 1_000)?,
            max_batch_concurrency: parse_or("MAX_BATCH_CONCURRENCY", 64)?,
        })
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn publish_mode(&self) -> PublishMode {
        PublishMode::from_settings(self.sync_send, self.publish_timeout())
    }

    /// Rejects values that would make the service unusable.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.kafka.enabled && self.kafka.brokers.trim().is_empty() {
            anyhow::bail!("KAFKA_BOOTSTRAP_SERVERS is empty");
        }
        if self.kafka.topic.trim().is_empty() {
            anyhow::bail!("KAFKA_TOPIC_TRANSACTIONS is empty");
        }
        if !(1..=5).contains(&self.kafka.max_in_flight) {
            anyhow::bail!("KAFKA_PRODUCER_MAX_IN_FLIGHT must be between 1 and 5 for an idempotent producer");
        }
        if self.publish_timeout_ms == 0 {
            anyhow::bail!("KAFKA_PRODUCER_TIMEOUT_MS must be greater than 0");
        }
        if self.max_batch_concurrency == 0 {
            anyhow::bail!("MAX_BATCH_CONCURRENCY must be greater than 0");
        }
        if self.kafka.enabled {
            url::Url::parse(&self.schema_registry_url)
                .context("SCHEMA_REGISTRY_URL is not a valid URL")?;
        }

        Ok(())
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

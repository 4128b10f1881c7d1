use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::broker::{InMemoryBroker, KafkaBroker, MessageBroker};
use crate::codec::{AvroSerializer, SchemaRegistryClient, TRANSACTION_SCHEMA};
use crate::config::Config;
use crate::health::{BrokerChecker, DependencyChecker, SchemaRegistryChecker};
use crate::metrics::MetricsRecorder;
use crate::publisher::{PublishMode, Publisher};
use crate::services::IngestionService;
use crate::AppState;

const DRY_RUN_PARTITIONS: u32 = 3;
const DRY_RUN_RETENTION: usize = 1_000;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Every long-lived component of the ingestion pipeline.
pub struct Pipeline {
    pub broker: Arc<dyn MessageBroker>,
    pub publisher: Arc<Publisher>,
    pub ingestion: IngestionService,
    pub health_checkers: Vec<Arc<dyn DependencyChecker>>,
}

impl Pipeline {
    pub fn app_state(&self, config: &Config) -> AppState {
        AppState {
            ingestion: self.ingestion.clone(),
            health_checkers: Arc::new(self.health_checkers.clone()),
            max_batch_size: config.max_batch_size,
            start_time: Instant::now(),
        }
    }

    /// Interrupts pending bounded waits and flushes whatever the broker still holds.
    pub fn shutdown(&self, timeout: Duration) {
        self.publisher.interrupt();
        match self.broker.flush(timeout) {
            Ok(()) => info!("Producer flushed"),
            Err(e) => warn!(error = %e, "Producer flush did not complete"),
        }
    }
}

/// Connects to the broker, registers the schema and wires the pipeline.
///
/// With Kafka disabled, messages go to an in-memory broker and the schema id is 0.
pub async fn build_pipeline(
    config: &Config,
    metrics: MetricsRecorder,
    mode: PublishMode,
) -> Result<Pipeline> {
    let mut health_checkers: Vec<Arc<dyn DependencyChecker>> = Vec::new();

    let (broker, schema_id): (Arc<dyn MessageBroker>, u32) = if config.kafka.enabled {
        let broker: Arc<dyn MessageBroker> = Arc::new(
            KafkaBroker::new(&config.kafka).context("Failed to create Kafka producer")?,
        );

        let registry = SchemaRegistryClient::new(config.schema_registry_url.clone());
        let schema_id = registry
            .register(
                &SchemaRegistryClient::value_subject(&config.kafka.topic),
                TRANSACTION_SCHEMA,
            )
            .await
            .context("Failed to register transaction schema")?;
        health_checkers.push(Arc::new(SchemaRegistryChecker::new(registry)));

        (broker, schema_id)
    } else {
        warn!("Kafka is disabled; transactions are kept in memory only");
        let broker: Arc<dyn MessageBroker> = Arc::new(dry_run_broker());
        (broker, 0)
    };
    health_checkers.insert(0, Arc::new(BrokerChecker::new(broker.clone())));

    let serializer = AvroSerializer::new(schema_id).context("Invalid transaction schema")?;
    let publisher = Arc::new(Publisher::new(
        broker.clone(),
        serializer,
        config.kafka.topic.clone(),
        metrics.clone(),
    ));
    let ingestion = IngestionService::new(
        publisher.clone(),
        metrics,
        mode,
        config.max_batch_concurrency,
    );

    info!(
        topic = %config.kafka.topic,
        schema_id,
        mode = ?mode,
        "Ingestion pipeline ready"
    );

    Ok(Pipeline {
        broker,
        publisher,
        ingestion,
        health_checkers,
    })
}

/// Broker used when Kafka is disabled. Keeps a bounded window of recent messages.
fn dry_run_broker() -> InMemoryBroker {
    InMemoryBroker::new(DRY_RUN_PARTITIONS).with_retention(DRY_RUN_RETENTION)
}

pub struct ValidationReport {
    pub environment: bool,
    pub broker: bool,
    pub schema_registry: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.broker && self.schema_registry
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Kafka Connectivity:    {}", status(self.broker));
        println!("Schema Registry:       {}", status(self.schema_registry));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "PASS" } else { "FAIL" }
        );
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

/// Checks configuration and, when Kafka is enabled, broker and registry reachability.
pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        broker: true,
        schema_registry: true,
        errors: Vec::new(),
    };

    if let Err(e) = config.validate() {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if !config.kafka.enabled {
        return report;
    }

    if let Err(e) = validate_broker(config).await {
        report.broker = false;
        report.errors.push(format!("Kafka: {:#}", e));
    }

    let registry = SchemaRegistryClient::new(config.schema_registry_url.clone());
    if let Err(e) = registry.subjects().await {
        report.schema_registry = false;
        report.errors.push(format!("Schema registry: {}", e));
    }

    report
}

async fn validate_broker(config: &Config) -> Result<()> {
    let broker = KafkaBroker::new(&config.kafka)?;
    tokio::task::spawn_blocking(move || broker.probe(PROBE_TIMEOUT))
        .await
        .context("Broker probe task failed")??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KafkaConfig;

    fn dry_run_config() -> Config {
        Config {
            server_port: 8080,
            kafka: KafkaConfig {
                enabled: false,
                brokers: String::new(),
                topic: "transactions".to_string(),
                retries: 3,
                max_in_flight: 5,
                delivery_timeout_ms: 120_000,
                ssl_enabled: false,
                sasl_mechanism: None,
                sasl_username: None,
                sasl_password: None,
            },
            schema_registry_url: "http://localhost:8081".to_string(),
            publish_timeout_ms: 1_000,
            sync_send: false,
            max_batch_size: 1_000,
            max_batch_concurrency: 8,
        }
    }

    #[tokio::test]
    async fn test_dry_run_pipeline_has_broker_check_only() {
        let config = dry_run_config();
        let pipeline = build_pipeline(
            &config,
            MetricsRecorder::new().unwrap(),
            config.publish_mode(),
        )
        .await
        .unwrap();

        assert_eq!(pipeline.health_checkers.len(), 1);
        assert_eq!(pipeline.health_checkers[0].name(), "kafka");
        assert_eq!(pipeline.publisher.topic(), "transactions");
    }

    #[tokio::test]
    async fn test_dry_run_broker_retention_is_bounded() {
        use crate::broker::OutboundMessage;

        let broker = dry_run_broker();
        for i in 0..DRY_RUN_RETENTION + 25 {
            broker
                .submit(OutboundMessage {
                    topic: "transactions".to_string(),
                    key: format!("TX-{}", i),
                    payload: vec![0; 16],
                })
                .unwrap()
                .await
                .unwrap();
        }

        assert_eq!(broker.messages().len(), DRY_RUN_RETENTION);
    }

    #[tokio::test]
    async fn test_dry_run_validation_skips_connectivity() {
        let report = validate_environment(&dry_run_config()).await;
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn test_validation_reports_bad_environment() {
        let mut config = dry_run_config();
        config.max_batch_concurrency = 0;

        let report = validate_environment(&config).await;
        assert!(!report.environment);
        assert_eq!(report.errors.len(), 1);
    }
}

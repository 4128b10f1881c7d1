use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::info;

use super::{Acknowledgement, BrokerError, DeliveryReceipt, MessageBroker, OutboundMessage};
use crate::config::KafkaConfig;

/// Kafka producer shared by the whole process.
///
/// Delivery guarantees are entirely a matter of client configuration:
/// - `acks=all`: every in-sync replica must acknowledge
/// - `enable.idempotence=true`: broker-side de-duplication of retries
/// - bounded in-flight requests and retry count
/// - `lz4` compression
pub struct KafkaBroker {
    producer: FutureProducer,
}

impl KafkaBroker {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        info!("Initializing Kafka producer...");

        let producer: FutureProducer = producer_config(config)
            .create()
            .map_err(|e: KafkaError| BrokerError::Client(e.to_string()))?;

        info!(brokers = %config.brokers, "Kafka producer initialized");
        Ok(Self { producer })
    }
}

/// Connection settings plus the fixed reliability settings.
pub fn producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);
    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password)
            .set(
                "security.protocol",
                if config.ssl_enabled {
                    "sasl_ssl"
                } else {
                    "sasl_plaintext"
                },
            );
    }

    client_config
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .set(
            "max.in.flight.requests.per.connection",
            config.max_in_flight.to_string(),
        )
        .set("retries", config.retries.to_string())
        .set("compression.type", "lz4")
        .set("linger.ms", "5")
        .set("delivery.timeout.ms", config.delivery_timeout_ms.to_string());

    client_config
}

impl MessageBroker for KafkaBroker {
    fn submit(&self, message: OutboundMessage) -> Result<Acknowledgement, BrokerError> {
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload);

        match self.producer.send_result(record) {
            Ok(delivery) => {
                let topic = message.topic.clone();
                Ok(Box::pin(async move {
                    match delivery.await {
                        Ok(Ok((partition, offset))) => Ok(DeliveryReceipt {
                            topic,
                            partition,
                            offset,
                        }),
                        Ok(Err((kafka_err, _))) => Err(BrokerError::Delivery(kafka_err.to_string())),
                        Err(_) => Err(BrokerError::Cancelled),
                    }
                }))
            }
            Err((kafka_err, _)) => Err(BrokerError::Rejected(kafka_err.to_string())),
        }
    }

    fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        info!("Flushing Kafka producer (timeout: {:?})", timeout);
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| BrokerError::Client(e.to_string()))
    }

    fn probe(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.producer
            .client()
            .fetch_metadata(None, Timeout::After(timeout))
            .map(|_| ())
            .map_err(|e| BrokerError::Client(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KafkaConfig {
        KafkaConfig {
            enabled: true,
            brokers: "localhost:9092".to_string(),
            topic: "transactions".to_string(),
            retries: 3,
            max_in_flight: 5,
            delivery_timeout_ms: 30_000,
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
        }
    }

    #[test]
    fn test_producer_config_fixes_reliability_settings() {
        let client_config = producer_config(&config());

        assert_eq!(client_config.get("acks"), Some("all"));
        assert_eq!(client_config.get("enable.idempotence"), Some("true"));
        assert_eq!(
            client_config.get("max.in.flight.requests.per.connection"),
            Some("5")
        );
        assert_eq!(client_config.get("retries"), Some("3"));
        assert_eq!(client_config.get("compression.type"), Some("lz4"));
        assert_eq!(client_config.get("security.protocol"), Some("plaintext"));
    }

    #[test]
    fn test_sasl_over_ssl() {
        let mut cfg = config();
        cfg.ssl_enabled = true;
        cfg.sasl_mechanism = Some("PLAIN".to_string());
        cfg.sasl_username = Some("user".to_string());
        cfg.sasl_password = Some("secret".to_string());

        let client_config = producer_config(&cfg);
        assert_eq!(client_config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client_config.get("sasl.username"), Some("user"));
    }

    #[tokio::test]
    async fn test_producer_creation_does_not_connect() {
        assert!(KafkaBroker::new(&config()).is_ok());
    }
}

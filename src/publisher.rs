use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::broker::{BrokerError, DeliveryReceipt, MessageBroker, OutboundMessage};
use crate::codec::{AvroSerializer, CodecError};
use crate::domain::CanonicalTransaction;
use crate::metrics::{MetricsRecorder, TimerSample};

/// Invoked once with the final delivery result, on the completion task.
pub type CompletionCallback = Box<dyn FnOnce(&Result<DeliveryReceipt, BrokerError>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Return as soon as the message is queued; the outcome is logged and counted later.
    FireAndForget,
    /// Wait for the broker acknowledgement, at most for the given duration.
    BoundedWait(Duration),
}

impl PublishMode {
    pub fn from_settings(sync_send: bool, timeout: Duration) -> Self {
        if sync_send {
            PublishMode::BoundedWait(timeout)
        } else {
            PublishMode::FireAndForget
        }
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize transaction {transaction_id}: {source}")]
    Serialization {
        transaction_id: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to send transaction {transaction_id}: {source}")]
    Send {
        transaction_id: String,
        #[source]
        source: BrokerError,
    },

    #[error("Timeout after {timeout_ms}ms while sending transaction {transaction_id}")]
    Timeout {
        transaction_id: String,
        timeout_ms: u64,
    },

    #[error("Interrupted while sending transaction {transaction_id}")]
    Interrupted { transaction_id: String },
}

impl PublishError {
    pub fn transaction_id(&self) -> &str {
        match self {
            PublishError::Serialization { transaction_id, .. }
            | PublishError::Send { transaction_id, .. }
            | PublishError::Timeout { transaction_id, .. }
            | PublishError::Interrupted { transaction_id } => transaction_id,
        }
    }
}

#[derive(Debug)]
pub enum PublishOutcome {
    /// Queued; completion is reported through the pending handle.
    Pending(PendingDelivery),
    Delivered(DeliveryReceipt),
}

/// Handle on a queued message. Dropping it does not cancel delivery.
#[derive(Debug)]
pub struct PendingDelivery {
    transaction_id: String,
    receiver: oneshot::Receiver<Result<DeliveryReceipt, BrokerError>>,
}

impl PendingDelivery {
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Waits for the acknowledgement with no upper bound.
    pub async fn wait(self) -> Result<DeliveryReceipt, PublishError> {
        let transaction_id = self.transaction_id;
        match self.receiver.await {
            Ok(result) => result.map_err(|source| PublishError::Send {
                transaction_id,
                source,
            }),
            Err(_) => Err(PublishError::Send {
                transaction_id,
                source: BrokerError::Cancelled,
            }),
        }
    }

    /// Waits until the acknowledgement arrives, `timeout` elapses or `cancel` fires.
    pub async fn wait_with(
        self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReceipt, PublishError> {
        let transaction_id = self.transaction_id.clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PublishError::Interrupted { transaction_id }),
            waited = tokio::time::timeout(timeout, self.wait()) => match waited {
                Ok(result) => result,
                Err(_) => Err(PublishError::Timeout {
                    transaction_id,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }
}

/// Publishes canonical transactions to the ingestion topic, keyed by transaction id.
///
/// The publisher never retries; retries, idempotence and acknowledgement depth
/// belong to the broker client configuration.
pub struct Publisher {
    broker: Arc<dyn MessageBroker>,
    serializer: AvroSerializer,
    topic: String,
    metrics: MetricsRecorder,
    interrupt: CancellationToken,
}

impl Publisher {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        serializer: AvroSerializer,
        topic: String,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            broker,
            serializer,
            topic,
            metrics,
            interrupt: CancellationToken::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Interrupts every bounded wait in progress and any started afterwards.
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    pub async fn publish(
        &self,
        record: &CanonicalTransaction,
        mode: PublishMode,
    ) -> Result<PublishOutcome, PublishError> {
        self.publish_with(record, mode, None).await
    }

    /// Like [`publish`](Self::publish), additionally running `callback` with the
    /// delivery result once the broker answers.
    pub async fn publish_with(
        &self,
        record: &CanonicalTransaction,
        mode: PublishMode,
        callback: Option<CompletionCallback>,
    ) -> Result<PublishOutcome, PublishError> {
        let key = record.partition_key().to_string();
        let sample = self.metrics.start_producer_timer();
        let payload = match self.serializer.encode(record) {
            Ok(payload) => payload,
            Err(source) => {
                self.metrics.stop_producer_timer(sample);
                self.metrics.record_producer_failure();
                error!(transaction_id = %key, error = %source, "Failed to serialize transaction");
                return Err(PublishError::Serialization {
                    transaction_id: key,
                    source,
                });
            }
        };

        let pending = self.submit(key, payload, sample, callback)?;

        match mode {
            PublishMode::FireAndForget => Ok(PublishOutcome::Pending(pending)),
            PublishMode::BoundedWait(timeout) => pending
                .wait_with(timeout, &self.interrupt)
                .await
                .map(PublishOutcome::Delivered),
        }
    }

    fn submit(
        &self,
        key: String,
        payload: Vec<u8>,
        sample: TimerSample,
        callback: Option<CompletionCallback>,
    ) -> Result<PendingDelivery, PublishError> {
        let message = OutboundMessage {
            topic: self.topic.clone(),
            key: key.clone(),
            payload,
        };

        // Queueing happens here, on the caller, so same-key order is kept.
        let acknowledgement = match self.broker.submit(message) {
            Ok(ack) => ack,
            Err(source) => {
                self.metrics.stop_producer_timer(sample);
                self.metrics.record_producer_failure();
                error!(transaction_id = %key, error = %source, "Broker refused transaction");
                return Err(PublishError::Send {
                    transaction_id: key,
                    source,
                });
            }
        };

        let (sender, receiver) = oneshot::channel();
        let metrics = self.metrics.clone();
        let transaction_id = key.clone();

        tokio::spawn(async move {
            let result = acknowledgement.await;
            metrics.stop_producer_timer(sample);

            match &result {
                Ok(receipt) => {
                    metrics.record_producer_success();
                    debug!(
                        transaction_id = %transaction_id,
                        topic = %receipt.topic,
                        partition = receipt.partition,
                        offset = receipt.offset,
                        "Transaction sent successfully"
                    );
                }
                Err(e) => {
                    metrics.record_producer_failure();
                    error!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Failed to send transaction"
                    );
                }
            }

            if let Some(callback) = callback {
                callback(&result);
            }
            let _ = sender.send(result);
        });

        Ok(PendingDelivery {
            transaction_id: key,
            receiver,
        })
    }
}

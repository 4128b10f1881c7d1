use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::domain::TransactionRequest;
use crate::mapper::{self, MappingError};
use crate::metrics::MetricsRecorder;
use crate::publisher::{CompletionCallback, PublishError, PublishMode, Publisher};

#[derive(Error, Debug)]
#[error("Failed to process transaction {transaction_id}: {cause}")]
pub struct ProcessingError {
    pub transaction_id: String,
    #[source]
    pub cause: ProcessingCause,
}

#[derive(Error, Debug)]
pub enum ProcessingCause {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("not admitted: {0}")]
    NotAdmitted(String),
}

/// Hook consulted before a transaction is mapped.
///
/// The throttling flag is passed through but the default policy ignores it;
/// what throttling should do (reject, queue, degrade) is left to the policy.
pub trait AdmissionPolicy: Send + Sync {
    fn admit(&self, request: &TransactionRequest, throttling_enabled: bool) -> Result<(), String>;
}

/// Admits everything.
pub struct AdmitAll;

impl AdmissionPolicy for AdmitAll {
    fn admit(&self, _request: &TransactionRequest, _throttling_enabled: bool) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_size: usize,
    pub submitted: usize,
    pub rejected: usize,
}

/// Entry point of the pipeline: request → mapping → publish, with metrics at each step.
#[derive(Clone)]
pub struct IngestionService {
    publisher: Arc<Publisher>,
    metrics: MetricsRecorder,
    mode: PublishMode,
    batch_permits: Arc<Semaphore>,
    admission: Arc<dyn AdmissionPolicy>,
}

impl IngestionService {
    pub fn new(
        publisher: Arc<Publisher>,
        metrics: MetricsRecorder,
        mode: PublishMode,
        max_batch_concurrency: usize,
    ) -> Self {
        Self {
            publisher,
            metrics,
            mode,
            batch_permits: Arc::new(Semaphore::new(max_batch_concurrency.max(1))),
            admission: Arc::new(AdmitAll),
        }
    }

    pub fn with_admission_policy(mut self, admission: Arc<dyn AdmissionPolicy>) -> Self {
        self.admission = admission;
        self
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Maps and submits one transaction.
    ///
    /// `Ok` means the message was handed to the broker, not that it was
    /// delivered. In fire-and-forget mode delivery failures only show up in
    /// the failure counter and the log.
    pub async fn process_one(&self, request: &TransactionRequest) -> Result<(), ProcessingError> {
        self.metrics.record_transaction_received();
        let sample = self.metrics.start_processing_timer();
        self.metrics.record_transaction_amount(request.amount.as_ref());

        match self.submit(request).await {
            Ok(()) => {
                self.metrics.stop_processing_timer(sample);
                self.metrics.record_transaction_processed();
                debug!(transaction_id = %request.transaction_id, "Transaction submitted");
                Ok(())
            }
            Err(cause) => {
                self.metrics.discard_timer(sample);
                self.metrics.record_transaction_failed();
                error!(
                    transaction_id = %request.transaction_id,
                    error = %cause,
                    "Error processing transaction request"
                );
                Err(ProcessingError {
                    transaction_id: request.transaction_id.clone(),
                    cause,
                })
            }
        }
    }

    async fn submit(&self, request: &TransactionRequest) -> Result<(), ProcessingCause> {
        self.admission
            .admit(request, self.metrics.is_throttling_enabled())
            .map_err(ProcessingCause::NotAdmitted)?;

        let record = mapper::to_canonical(request)?;

        let callback = match self.mode {
            PublishMode::FireAndForget => Some(self.delivery_failure_callback(request)),
            PublishMode::BoundedWait(_) => None,
        };

        self.publisher
            .publish_with(&record, self.mode, callback)
            .await?;
        Ok(())
    }

    fn delivery_failure_callback(&self, request: &TransactionRequest) -> CompletionCallback {
        let metrics = self.metrics.clone();
        let transaction_id = request.transaction_id.clone();

        Box::new(move |result| {
            if let Err(e) = result {
                metrics.record_transaction_failed();
                error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Error processing transaction"
                );
            }
        })
    }

    /// Submits every request of a batch independently.
    ///
    /// At most `max_batch_concurrency` items are in flight at once. A failing
    /// item never affects its siblings and is never returned to the caller;
    /// the summary only counts outcomes. Returns once every item is submitted.
    pub async fn process_batch(&self, requests: Vec<TransactionRequest>) -> BatchSummary {
        let batch_size = requests.len();
        self.metrics.record_batch_received(batch_size);
        info!(batch_size, "Processing transaction batch");

        let mut summary = BatchSummary {
            batch_size,
            ..BatchSummary::default()
        };
        let mut tasks = JoinSet::new();

        for request in requests {
            let permit = match self.batch_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Batch permits closed");
                    summary.rejected += 1;
                    continue;
                }
            };

            let service = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                service.process_one(&request).await.is_ok()
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => summary.submitted += 1,
                Ok(false) => summary.rejected += 1,
                Err(e) => {
                    error!(error = %e, "Batch item task aborted");
                    summary.rejected += 1;
                }
            }
        }

        info!(
            batch_size,
            submitted = summary.submitted,
            rejected = summary.rejected,
            "Transaction batch submitted"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{AckBehavior, InMemoryBroker};
    use crate::codec::AvroSerializer;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use std::time::Duration;

    fn request(id: &str, amount: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: id.to_string(),
            timestamp: None,
            amount: Some(BigDecimal::from_str(amount).unwrap()),
            currency: "USD".to_string(),
            customer_id: "CUST-1".to_string(),
            customer_name: None,
            source_id: "ACCT-1".to_string(),
            source_type: None,
            destination_id: None,
            destination_type: None,
            transaction_type: "PURCHASE".to_string(),
            metadata: None,
        }
    }

    fn service(broker: Arc<InMemoryBroker>, mode: PublishMode) -> IngestionService {
        let metrics = MetricsRecorder::new().unwrap();
        let publisher = Publisher::new(
            broker,
            AvroSerializer::new(1).unwrap(),
            "transactions".to_string(),
            metrics.clone(),
        );
        IngestionService::new(Arc::new(publisher), metrics, mode, 4)
    }

    #[tokio::test]
    async fn test_process_one_counts_received_and_processed() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let service = service(broker.clone(), PublishMode::FireAndForget);

        service.process_one(&request("TX-001", "150.75")).await.unwrap();

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.transactions_received, 1);
        assert_eq!(snapshot.transactions_processed, 1);
        assert_eq!(snapshot.transactions_failed, 0);
        assert_eq!(broker.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_mapping_failure_is_raised_and_not_published() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let service = service(broker.clone(), PublishMode::FireAndForget);

        let err = service
            .process_one(&request("TX-BAD", "1.005"))
            .await
            .unwrap_err();

        assert_eq!(err.transaction_id, "TX-BAD");
        assert!(matches!(err.cause, ProcessingCause::Mapping(_)));
        assert!(broker.messages().is_empty());

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.transactions_received, 1);
        assert_eq!(snapshot.transactions_failed, 1);
        assert_eq!(snapshot.transactions_processed, 0);
    }

    #[tokio::test]
    async fn test_fire_and_forget_delivery_failure_is_not_raised() {
        let broker = Arc::new(InMemoryBroker::new(1).with_behavior(AckBehavior::Fail));
        let service = service(broker, PublishMode::FireAndForget);

        assert!(service.process_one(&request("TX-1", "5.00")).await.is_ok());

        // The completion task records the failure once the broker answers.
        for _ in 0..50 {
            if service.metrics().snapshot().transactions_failed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.transactions_processed, 1);
        assert_eq!(snapshot.transactions_failed, 1);
    }

    #[tokio::test]
    async fn test_bounded_wait_delivery_failure_is_raised_once() {
        let broker = Arc::new(InMemoryBroker::new(1).with_behavior(AckBehavior::Fail));
        let service = service(broker, PublishMode::BoundedWait(Duration::from_secs(1)));

        let err = service.process_one(&request("TX-1", "5.00")).await.unwrap_err();
        assert!(matches!(
            err.cause,
            ProcessingCause::Publish(PublishError::Send { .. })
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.metrics().snapshot().transactions_failed, 1);
    }

    #[tokio::test]
    async fn test_admission_policy_can_refuse() {
        struct RefuseWhenThrottled;
        impl AdmissionPolicy for RefuseWhenThrottled {
            fn admit(&self, _: &TransactionRequest, throttling: bool) -> Result<(), String> {
                if throttling {
                    Err("throttled".to_string())
                } else {
                    Ok(())
                }
            }
        }

        let broker = Arc::new(InMemoryBroker::new(1));
        let service = service(broker, PublishMode::FireAndForget)
            .with_admission_policy(Arc::new(RefuseWhenThrottled));

        service.metrics().set_throttling_enabled(true);
        let err = service.process_one(&request("TX-1", "5.00")).await.unwrap_err();
        assert!(matches!(err.cause, ProcessingCause::NotAdmitted(_)));
    }

    #[tokio::test]
    async fn test_default_policy_ignores_throttling() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let service = service(broker, PublishMode::FireAndForget);

        service.metrics().set_throttling_enabled(true);
        assert!(service.process_one(&request("TX-1", "5.00")).await.is_ok());
    }

    #[tokio::test]
    async fn test_batch_isolates_failing_item() {
        let broker = Arc::new(InMemoryBroker::new(4));
        let service = service(broker.clone(), PublishMode::FireAndForget);

        let mut batch: Vec<_> = (0..9)
            .map(|i| request(&format!("TX-{}", i), "10.00"))
            .collect();
        batch.insert(4, request("TX-BAD", "10.001"));

        let summary = service.process_batch(batch).await;

        assert_eq!(
            summary,
            BatchSummary {
                batch_size: 10,
                submitted: 9,
                rejected: 1
            }
        );
        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.transactions_received, 10);
        assert_eq!(snapshot.transactions_processed, 9);
        assert_eq!(snapshot.transactions_failed, 1);
        assert_eq!(broker.messages().len(), 9);
        assert_eq!(service.metrics().batch_received_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_recorded() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let service = service(broker, PublishMode::FireAndForget);

        let summary = service.process_batch(Vec::new()).await;
        assert_eq!(summary.submitted, 0);
        assert_eq!(service.metrics().batch_received_count(), 1);
    }
}

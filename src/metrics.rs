use bigdecimal::BigDecimal;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramTimer, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];
const AMOUNT_BUCKETS: &[f64] = &[
    1.0, 10.0, 50.0, 100.0, 500.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0, 100_000.0,
];
const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1_000.0];

/// A started timer; dropping it without stopping still records the elapsed time.
pub struct TimerSample(HistogramTimer);

/// Read-only view of the ingestion counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub transactions_received: u64,
    pub transactions_processed: u64,
    pub transactions_failed: u64,
    pub average_processing_time_ms: f64,
    pub last_processing_time_ms: u64,
    pub throttling_enabled: bool,
}

/// Counters, timers and distributions for the ingestion pipeline.
///
/// Built once at startup and handed to every component that records into it.
/// Clones share the same underlying registry.
#[derive(Clone)]
pub struct MetricsRecorder {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    transactions_received: IntCounter,
    transactions_processed: IntCounter,
    transactions_failed: IntCounter,
    producer_success: IntCounter,
    producer_failure: IntCounter,
    batch_received: IntCounter,
    processing_time: Histogram,
    producer_time: Histogram,
    transaction_amount: Histogram,
    batch_size: Histogram,
    last_processing_time_ms: IntGauge,
    throttling_enabled: AtomicBool,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let histogram =
            |name: &str, help: &str, buckets: &[f64]| -> Result<Histogram, prometheus::Error> {
                let h = Histogram::with_opts(
                    HistogramOpts::new(name, help).buckets(buckets.to_vec()),
                )?;
                registry.register(Box::new(h.clone()))?;
                Ok(h)
            };

        let transactions_received =
            counter("transactions_received_total", "Number of transactions received")?;
        let transactions_processed = counter(
            "transactions_processed_total",
            "Number of transactions submitted to the broker",
        )?;
        let transactions_failed =
            counter("transactions_failed_total", "Number of transactions that failed")?;
        let producer_success = counter(
            "kafka_producer_success_total",
            "Number of messages acknowledged by the broker",
        )?;
        let producer_failure = counter(
            "kafka_producer_failure_total",
            "Number of messages the broker failed to accept",
        )?;
        let batch_received =
            counter("transactions_batch_received_total", "Number of batch requests received")?;

        let processing_time = histogram(
            "transactions_processing_seconds",
            "Time taken to process a transaction",
            LATENCY_BUCKETS,
        )?;
        let producer_time = histogram(
            "kafka_producer_seconds",
            "Time from serialization to broker acknowledgement",
            LATENCY_BUCKETS,
        )?;
        let transaction_amount = histogram(
            "transactions_amount",
            "Distribution of transaction amounts",
            AMOUNT_BUCKETS,
        )?;
        let batch_size = histogram(
            "transactions_batch_size",
            "Distribution of batch sizes",
            BATCH_SIZE_BUCKETS,
        )?;

        let last_processing_time_ms = IntGauge::with_opts(Opts::new(
            "transactions_last_processing_time_ms",
            "Processing time of the most recent transaction",
        ))?;
        registry.register(Box::new(last_processing_time_ms.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                transactions_received,
                transactions_processed,
                transactions_failed,
                producer_success,
                producer_failure,
                batch_received,
                processing_time,
                producer_time,
                transaction_amount,
                batch_size,
                last_processing_time_ms,
                throttling_enabled: AtomicBool::new(false),
            }),
        })
    }

    pub fn record_transaction_received(&self) {
        self.inner.transactions_received.inc();
    }

    pub fn record_transaction_processed(&self) {
        self.inner.transactions_processed.inc();
    }

    pub fn record_transaction_failed(&self) {
        self.inner.transactions_failed.inc();
    }

    pub fn record_batch_received(&self, batch_size: usize) {
        self.inner.batch_received.inc();
        self.inner.batch_size.observe(batch_size as f64);
    }

    pub fn record_producer_success(&self) {
        self.inner.producer_success.inc();
    }

    pub fn record_producer_failure(&self) {
        self.inner.producer_failure.inc();
    }

    /// Missing or non-numeric amounts are skipped.
    pub fn record_transaction_amount(&self, amount: Option<&BigDecimal>) {
        if let Some(value) = amount.and_then(|a| a.to_string().parse::<f64>().ok()) {
            self.inner.transaction_amount.observe(value);
        }
    }

    pub fn start_processing_timer(&self) -> TimerSample {
        TimerSample(self.inner.processing_time.start_timer())
    }

    pub fn stop_processing_timer(&self, sample: TimerSample) {
        let elapsed = sample.0.stop_and_record();
        self.inner
            .last_processing_time_ms
            .set((elapsed * 1_000.0) as i64);
    }

    /// Stops a sample without recording it.
    pub fn discard_timer(&self, sample: TimerSample) {
        sample.0.stop_and_discard();
    }

    pub fn start_producer_timer(&self) -> TimerSample {
        TimerSample(self.inner.producer_time.start_timer())
    }

    pub fn stop_producer_timer(&self, sample: TimerSample) {
        sample.0.observe_duration();
    }

    pub fn set_throttling_enabled(&self, enabled: bool) {
        self.inner.throttling_enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "Transaction throttling updated");
    }

    pub fn is_throttling_enabled(&self) -> bool {
        self.inner.throttling_enabled.load(Ordering::SeqCst)
    }

    pub fn producer_success_count(&self) -> u64 {
        self.inner.producer_success.get()
    }

    pub fn producer_failure_count(&self) -> u64 {
        self.inner.producer_failure.get()
    }

    pub fn batch_received_count(&self) -> u64 {
        self.inner.batch_received.get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = self.inner.processing_time.get_sample_count();
        let average_processing_time_ms = if count == 0 {
            0.0
        } else {
            self.inner.processing_time.get_sample_sum() * 1_000.0 / count as f64
        };

        MetricsSnapshot {
            transactions_received: self.inner.transactions_received.get(),
            transactions_processed: self.inner.transactions_processed.get(),
            transactions_failed: self.inner.transactions_failed.get(),
            average_processing_time_ms,
            last_processing_time_ms: self.inner.last_processing_time_ms.get().max(0) as u64,
            throttling_enabled: self.is_throttling_enabled(),
        }
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

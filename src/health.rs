use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::broker::MessageBroker;
use crate::codec::SchemaRegistryClient;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// A failing critical dependency makes the whole service unhealthy.
    fn critical(&self) -> bool {
        false
    }

    async fn check(&self) -> DependencyStatus;
}

pub struct BrokerChecker {
    broker: Arc<dyn MessageBroker>,
}

impl BrokerChecker {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl DependencyChecker for BrokerChecker {
    fn name(&self) -> &'static str {
        "kafka"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let broker = self.broker.clone();

        // Metadata requests block the calling thread.
        match tokio::task::spawn_blocking(move || broker.probe(CHECK_TIMEOUT)).await {
            Ok(Ok(())) => DependencyStatus::healthy(start),
            Ok(Err(e)) => DependencyStatus::unhealthy(e.to_string()),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

pub struct SchemaRegistryChecker {
    client: SchemaRegistryClient,
}

impl SchemaRegistryChecker {
    pub fn new(client: SchemaRegistryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for SchemaRegistryChecker {
    fn name(&self) -> &'static str {
        "schema_registry"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.subjects().await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

pub async fn check_health(
    checkers: &[Arc<dyn DependencyChecker>],
    start_time: Instant,
) -> HealthResponse {
    let results = futures::future::join_all(
        checkers
            .iter()
            .map(|checker| timeout(CHECK_TIMEOUT, checker.check())),
    )
    .await;

    let mut dependencies = HashMap::new();
    let mut critical = Vec::new();

    for (checker, result) in checkers.iter().zip(results) {
        if checker.critical() {
            critical.push(checker.name());
        }
        dependencies.insert(
            checker.name().to_string(),
            result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
        );
    }

    let overall_status = determine_overall_status(&dependencies, &critical);

    HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(
    dependencies: &HashMap<String, DependencyStatus>,
    critical_deps: &[&str],
) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical_deps.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

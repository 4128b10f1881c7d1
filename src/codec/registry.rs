use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const SCHEMA_REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema registry request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Schema registry rejected subject {subject} with status {status}: {body}")]
    Rejected {
        subject: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: u32,
}

/// HTTP client for a Confluent-compatible schema registry
#[derive(Clone)]
pub struct SchemaRegistryClient {
    client: Client,
    base_url: String,
}

impl SchemaRegistryClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        SchemaRegistryClient { client, base_url }
    }

    /// Value subject for a topic under the default topic-name strategy.
    pub fn value_subject(topic: &str) -> String {
        format!("{}-value", topic)
    }

    /// Registers `schema` under `subject` and returns its global id. Registering an
    /// identical schema again returns the existing id.
    pub async fn register(&self, subject: &str, schema: &str) -> Result<u32, SchemaError> {
        let url = format!(
            "{}/subjects/{}/versions",
            self.base_url.trim_end_matches('/'),
            subject
        );
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, SCHEMA_REGISTRY_CONTENT_TYPE)
            .json(&RegisterRequest { schema })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchemaError::Rejected {
                subject: subject.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let registered = response.json::<RegisterResponse>().await?;
        tracing::info!(subject = %subject, schema_id = registered.id, "Schema registered");
        Ok(registered.id)
    }

    /// Lists registered subjects; used as a connectivity probe.
    pub async fn subjects(&self) -> Result<Vec<String>, SchemaError> {
        let url = format!("{}/subjects", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchemaError::Rejected {
                subject: "*".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<Vec<String>>().await?)
    }
}

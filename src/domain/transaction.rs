//! Transaction domain entities.
//! `TransactionRequest` is what callers submit; `CanonicalTransaction` is the
//! fixed, non-nullable record written to the broker.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Scale of every monetary amount carried on the wire.
pub const AMOUNT_SCALE: i64 = 2;

/// Total digits (integer + fraction) the wire schema can hold.
pub const AMOUNT_PRECISION: u64 = 18;

/// Incoming transaction, already accepted by request validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub transaction_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Option<BigDecimal>,
    pub currency: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub source_id: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub destination_id: Option<String>,
    #[serde(default)]
    pub destination_type: Option<String>,
    pub transaction_type: String,
    #[serde(default)]
    pub metadata: Option<MetadataRequest>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRequest {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Wire representation of a transaction. Every string is present (possibly
/// empty) and `metadata` is always populated.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTransaction {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_id: String,
    pub customer_name: String,
    pub source_id: String,
    pub source_type: String,
    pub destination_id: String,
    pub destination_type: String,
    pub transaction_type: String,
    pub metadata: Metadata,
}

impl CanonicalTransaction {
    /// Key used to route the record to a broker partition.
    pub fn partition_key(&self) -> &str {
        &self.transaction_id
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub ip_address: String,
    pub device_id: String,
    pub location: Option<Location>,
    pub user_agent: String,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.ip_address.is_empty()
            && self.device_id.is_empty()
            && self.location.is_none()
            && self.user_agent.is_empty()
    }
}

/// Reads the amount from its literal text, so JSON numbers never pass through `f64`.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => BigDecimal::from_str(&number.to_string())
            .map(Some)
            .map_err(D::Error::custom),
        Some(Value::String(text)) => BigDecimal::from_str(text.trim())
            .map(Some)
            .map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!(
            "amount must be a number or a numeric string, got {}",
            other
        ))),
    }
}

//! Request-to-canonical mapping.
//! Fills every optional field with its default so the record satisfies the
//! non-nullable wire schema.

use chrono::Utc;
use thiserror::Error;

use crate::codec::{decimal, CodecError};
use crate::domain::{
    CanonicalTransaction, Metadata, MetadataRequest, TransactionRequest, AMOUNT_SCALE,
};

#[derive(Error, Debug)]
#[error("Failed to map transaction {transaction_id}: {source}")]
pub struct MappingError {
    pub transaction_id: String,
    #[source]
    pub source: CodecError,
}

/// Converts a validated request into the canonical record.
///
/// A missing timestamp is replaced by the current time, so two otherwise
/// identical requests without timestamps do not map to identical records.
pub fn to_canonical(request: &TransactionRequest) -> Result<CanonicalTransaction, MappingError> {
    let amount = decimal::encode(request.amount.as_ref(), AMOUNT_SCALE)
        .and_then(|bytes| decimal::decode(&bytes, AMOUNT_SCALE))
        .map_err(|source| MappingError {
            transaction_id: request.transaction_id.clone(),
            source,
        })?;

    Ok(CanonicalTransaction {
        transaction_id: request.transaction_id.clone(),
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
        amount,
        currency: request.currency.clone(),
        customer_id: request.customer_id.clone(),
        customer_name: or_empty(&request.customer_name),
        source_id: request.source_id.clone(),
        source_type: or_empty(&request.source_type),
        destination_id: or_empty(&request.destination_id),
        destination_type: or_empty(&request.destination_type),
        transaction_type: request.transaction_type.clone(),
        metadata: request
            .metadata
            .as_ref()
            .map(to_metadata)
            .unwrap_or_default(),
    })
}

fn to_metadata(metadata: &MetadataRequest) -> Metadata {
    Metadata {
        ip_address: or_empty(&metadata.ip_address),
        device_id: or_empty(&metadata.device_id),
        // Range checks belong to request validation.
        location: metadata.location,
        user_agent: or_empty(&metadata.user_agent),
    }
}

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Location;
    use bigdecimal::BigDecimal;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn request() -> TransactionRequest {
        TransactionRequest {
            transaction_id: "TX-001".to_string(),
            timestamp: None,
            amount: Some(BigDecimal::from_str("150.75").unwrap()),
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

    #[test]
    fn test_absent_metadata_becomes_empty_metadata() {
        let tx = to_canonical(&request()).unwrap();

        assert_eq!(tx.metadata, Metadata::default());
        assert_eq!(tx.metadata.ip_address, "");
        assert_eq!(tx.metadata.device_id, "");
        assert_eq!(tx.metadata.user_agent, "");
        assert!(tx.metadata.location.is_none());
    }

    #[test]
    fn test_optional_strings_default_to_empty() {
        let tx = to_canonical(&request()).unwrap();

        assert_eq!(tx.customer_name, "");
        assert_eq!(tx.source_type, "");
        assert_eq!(tx.destination_id, "");
        assert_eq!(tx.destination_type, "");
        assert_eq!(tx.amount, BigDecimal::from_str("150.75").unwrap());
    }

    #[test]
    fn test_partial_metadata_fills_gaps() {
        let mut req = request();
        req.metadata = Some(MetadataRequest {
            device_id: Some("device-9".to_string()),
            ..MetadataRequest::default()
        });

        let tx = to_canonical(&req).unwrap();
        assert_eq!(tx.metadata.device_id, "device-9");
        assert_eq!(tx.metadata.ip_address, "");
        assert_eq!(tx.metadata.user_agent, "");
    }

    #[test]
    fn test_location_copied_without_range_checks() {
        let mut req = request();
        req.metadata = Some(MetadataRequest {
            location: Some(Location {
                latitude: 123.0,
                longitude: -500.0,
            }),
            ..MetadataRequest::default()
        });

        let tx = to_canonical(&req).unwrap();
        assert_eq!(
            tx.metadata.location,
            Some(Location {
                latitude: 123.0,
                longitude: -500.0
            })
        );
    }

    #[test]
    fn test_explicit_timestamp_is_kept() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut req = request();
        req.timestamp = Some(ts);

        assert_eq!(to_canonical(&req).unwrap().timestamp, ts);
        assert_eq!(to_canonical(&req).unwrap(), to_canonical(&req).unwrap());
    }

    #[test]
    fn test_missing_timestamp_uses_mapping_time() {
        let before = Utc::now();
        let tx = to_canonical(&request()).unwrap();
        assert!(tx.timestamp >= before);
        assert!(tx.timestamp <= Utc::now());
    }

    #[test]
    fn test_unencodable_amount_is_mapping_error() {
        let mut req = request();
        req.amount = Some(BigDecimal::from_str("10.005").unwrap());

        let err = to_canonical(&req).unwrap_err();
        assert_eq!(err.transaction_id, "TX-001");
        assert!(matches!(err.source, CodecError::Encoding(_)));

        req.amount = None;
        assert!(to_canonical(&req).is_err());
    }
}

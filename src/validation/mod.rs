//! Field checks applied to incoming requests before they reach the pipeline.

use bigdecimal::BigDecimal;
use std::fmt;

use crate::domain::{Location, MetadataRequest, TransactionRequest};

pub const IDENTIFIER_MAX_LEN: usize = 50;
pub const CUSTOMER_NAME_MAX_LEN: usize = 100;
pub const SHORT_FIELD_MAX_LEN: usize = 50;
pub const DEVICE_ID_MAX_LEN: usize = 100;
pub const USER_AGENT_MAX_LEN: usize = 500;
pub const AMOUNT_MAX_INTEGER_DIGITS: i64 = 16;
pub const AMOUNT_MAX_FRACTION_DIGITS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

fn validate_optional_max_len(
    field: &'static str,
    value: &Option<String>,
    max_len: usize,
) -> ValidationResult {
    match value {
        Some(v) => validate_max_len(field, v, max_len),
        None => Ok(()),
    }
}

/// Letters, digits, `-` and `_`, between 1 and 50 characters.
pub fn validate_identifier(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, IDENTIFIER_MAX_LEN)?;

    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(
            field,
            "must contain only letters, digits, '-' and '_'",
        ));
    }

    Ok(())
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be a 3-letter ISO currency code",
        ));
    }

    Ok(())
}

/// At least 0.01, at most 16 integer digits and 2 fraction digits.
pub fn validate_amount(amount: Option<&BigDecimal>) -> ValidationResult {
    let amount = amount.ok_or_else(|| ValidationError::new("amount", "is required"))?;

    let minimum = BigDecimal::new(1.into(), AMOUNT_MAX_FRACTION_DIGITS);
    if amount < &minimum {
        return Err(ValidationError::new("amount", "must be greater than 0"));
    }

    let (unscaled, scale) = amount.normalized().as_bigint_and_exponent();
    let digits = unscaled.magnitude().to_string().len() as i64;
    let fraction_digits = scale.max(0);
    let integer_digits = digits - scale;

    if fraction_digits > AMOUNT_MAX_FRACTION_DIGITS || integer_digits > AMOUNT_MAX_INTEGER_DIGITS {
        return Err(ValidationError::new(
            "amount",
            format!(
                "cannot exceed {} integer digits with {} decimal places",
                AMOUNT_MAX_INTEGER_DIGITS, AMOUNT_MAX_FRACTION_DIGITS
            ),
        ));
    }

    Ok(())
}

/// Dotted quad of 1-3 digit groups.
pub fn validate_ipv4(ip_address: &str) -> ValidationResult {
    let groups: Vec<&str> = ip_address.split('.').collect();
    let well_formed = groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.chars().all(|ch| ch.is_ascii_digit()));

    if !well_formed {
        return Err(ValidationError::new(
            "metadata.ipAddress",
            "must be a valid IPv4 address",
        ));
    }

    Ok(())
}

pub fn validate_location(location: &Location) -> ValidationResult {
    if !(-90.0..=90.0).contains(&location.latitude) {
        return Err(ValidationError::new(
            "metadata.location.latitude",
            "must be between -90 and 90",
        ));
    }
    if !(-180.0..=180.0).contains(&location.longitude) {
        return Err(ValidationError::new(
            "metadata.location.longitude",
            "must be between -180 and 180",
        ));
    }

    Ok(())
}

fn validate_metadata(metadata: &MetadataRequest) -> ValidationResult {
    if let Some(ip) = &metadata.ip_address {
        validate_ipv4(ip)?;
    }
    validate_optional_max_len("metadata.deviceId", &metadata.device_id, DEVICE_ID_MAX_LEN)?;
    validate_optional_max_len("metadata.userAgent", &metadata.user_agent, USER_AGENT_MAX_LEN)?;
    if let Some(location) = &metadata.location {
        validate_location(location)?;
    }

    Ok(())
}

/// Checks every field of a transaction request, stopping at the first failure.
pub fn validate_transaction(request: &TransactionRequest) -> ValidationResult {
    validate_identifier("transactionId", &request.transaction_id)?;
    validate_amount(request.amount.as_ref())?;
    validate_currency(&request.currency)?;
    validate_identifier("customerId", &request.customer_id)?;
    validate_optional_max_len("customerName", &request.customer_name, CUSTOMER_NAME_MAX_LEN)?;
    validate_identifier("sourceId", &request.source_id)?;
    validate_optional_max_len("sourceType", &request.source_type, SHORT_FIELD_MAX_LEN)?;
    validate_optional_max_len("destinationId", &request.destination_id, SHORT_FIELD_MAX_LEN)?;
    validate_optional_max_len(
        "destinationType",
        &request.destination_type,
        SHORT_FIELD_MAX_LEN,
    )?;
    validate_required("transactionType", &request.transaction_type)?;
    validate_max_len("transactionType", &request.transaction_type, SHORT_FIELD_MAX_LEN)?;

    if let Some(metadata) = &request.metadata {
        validate_metadata(metadata)?;
    }

    Ok(())
}

pub fn validate_batch(requests: &[TransactionRequest], max_batch_size: usize) -> ValidationResult {
    if requests.is_empty() {
        return Err(ValidationError::new("batch", "cannot be empty"));
    }
    if requests.len() > max_batch_size {
        return Err(ValidationError::new(
            "batch",
            format!("cannot exceed {} transactions", max_batch_size),
        ));
    }

    requests.iter().try_for_each(validate_transaction)
}

use apache_avro::types::Value;
use apache_avro::{from_avro_datum, to_avro_datum, Decimal, Schema};
use chrono::{TimeZone, Utc};

use super::{decimal, CodecError};
use crate::domain::{CanonicalTransaction, Location, Metadata, AMOUNT_SCALE};

/// Confluent wire-format magic byte.
const MAGIC_BYTE: u8 = 0;
const HEADER_LEN: usize = 5;

/// Avro schema of the record published for every ingested transaction.
/// No field is nullable except `metadata.location`.
pub const TRANSACTION_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "Transaction",
  "namespace": "com.fraudrisk.model",
  "fields": [
    {"name": "transactionId", "type": "string"},
    {"name": "timestamp", "type": {"type": "long", "logicalType": "timestamp-millis"}},
    {"name": "amount", "type": {"type": "bytes", "logicalType": "decimal", "precision": 18, "scale": 2}},
    {"name": "currency", "type": "string"},
    {"name": "customerId", "type": "string"},
    {"name": "customerName", "type": "string"},
    {"name": "sourceId", "type": "string"},
    {"name": "sourceType", "type": "string"},
    {"name": "destinationId", "type": "string"},
    {"name": "destinationType", "type": "string"},
    {"name": "transactionType", "type": "string"},
    {"name": "metadata", "type": {
      "type": "record",
      "name": "Metadata",
      "fields": [
        {"name": "ipAddress", "type": "string"},
        {"name": "deviceId", "type": "string"},
        {"name": "location", "type": ["null", {
          "type": "record",
          "name": "Location",
          "fields": [
            {"name": "latitude", "type": "double"},
            {"name": "longitude", "type": "double"}
          ]
        }], "default": null},
        {"name": "userAgent", "type": "string"}
      ]
    }}
  ]
}
"#;

/// Serializes canonical transactions into Confluent-framed Avro payloads.
#[derive(Debug, Clone)]
pub struct AvroSerializer {
    schema: Schema,
    schema_id: u32,
}

impl AvroSerializer {
    /// Builds a serializer for the embedded transaction schema, registered under `schema_id`.
    pub fn new(schema_id: u32) -> Result<Self, CodecError> {
        let schema = Schema::parse_str(TRANSACTION_SCHEMA)?;
        Ok(Self { schema, schema_id })
    }

    pub fn encode(&self, transaction: &CanonicalTransaction) -> Result<Vec<u8>, CodecError> {
        let value = to_value(transaction)?;
        let datum = to_avro_datum(&self.schema, value)?;

        let mut payload = Vec::with_capacity(HEADER_LEN + datum.len());
        payload.push(MAGIC_BYTE);
        payload.extend_from_slice(&self.schema_id.to_be_bytes());
        payload.extend_from_slice(&datum);
        Ok(payload)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<CanonicalTransaction, CodecError> {
        if payload.len() < HEADER_LEN || payload[0] != MAGIC_BYTE {
            return Err(CodecError::Decoding(
                "payload is not in Confluent wire format".to_string(),
            ));
        }

        let mut datum = &payload[HEADER_LEN..];
        let value = from_avro_datum(&self.schema, &mut datum, None)?;
        from_value(value)
    }
}

fn to_value(tx: &CanonicalTransaction) -> Result<Value, CodecError> {
    let amount = decimal::encode(Some(&tx.amount), AMOUNT_SCALE)?;

    let location = match tx.metadata.location {
        Some(loc) => Value::Union(
            1,
            Box::new(Value::Record(vec![
                ("latitude".to_string(), Value::Double(loc.latitude)),
                ("longitude".to_string(), Value::Double(loc.longitude)),
            ])),
        ),
        None => Value::Union(0, Box::new(Value::Null)),
    };

    let metadata = Value::Record(vec![
        ("ipAddress".to_string(), Value::String(tx.metadata.ip_address.clone())),
        ("deviceId".to_string(), Value::String(tx.metadata.device_id.clone())),
        ("location".to_string(), location),
        ("userAgent".to_string(), Value::String(tx.metadata.user_agent.clone())),
    ]);

    Ok(Value::Record(vec![
        ("transactionId".to_string(), Value::String(tx.transaction_id.clone())),
        ("timestamp".to_string(), Value::TimestampMillis(tx.timestamp.timestamp_millis())),
        ("amount".to_string(), Value::Decimal(Decimal::from(amount))),
        ("currency".to_string(), Value::String(tx.currency.clone())),
        ("customerId".to_string(), Value::String(tx.customer_id.clone())),
        ("customerName".to_string(), Value::String(tx.customer_name.clone())),
        ("sourceId".to_string(), Value::String(tx.source_id.clone())),
        ("sourceType".to_string(), Value::String(tx.source_type.clone())),
        ("destinationId".to_string(), Value::String(tx.destination_id.clone())),
        ("destinationType".to_string(), Value::String(tx.destination_type.clone())),
        ("transactionType".to_string(), Value::String(tx.transaction_type.clone())),
        ("metadata".to_string(), metadata),
    ]))
}

struct Fields(Vec<(String, Value)>);

impl Fields {
    fn from_record(value: Value, record: &str) -> Result<Self, CodecError> {
        match value {
            Value::Record(fields) => Ok(Self(fields)),
            other => Err(CodecError::Decoding(format!(
                "expected {} record, found {:?}",
                record, other
            ))),
        }
    }

    fn take(&mut self, name: &str) -> Result<Value, CodecError> {
        let index = self
            .0
            .iter()
            .position(|(field, _)| field == name)
            .ok_or_else(|| CodecError::Decoding(format!("missing field {}", name)))?;
        Ok(self.0.swap_remove(index).1)
    }

    fn string(&mut self, name: &str) -> Result<String, CodecError> {
        match self.take(name)? {
            Value::String(s) => Ok(s),
            other => Err(unexpected(name, &other)),
        }
    }

    fn double(&mut self, name: &str) -> Result<f64, CodecError> {
        match self.take(name)? {
            Value::Double(d) => Ok(d),
            other => Err(unexpected(name, &other)),
        }
    }
}

fn unexpected(name: &str, value: &Value) -> CodecError {
    CodecError::Decoding(format!("unexpected value for {}: {:?}", name, value))
}

fn from_value(value: Value) -> Result<CanonicalTransaction, CodecError> {
    let mut fields = Fields::from_record(value, "Transaction")?;

    let timestamp = match fields.take("timestamp")? {
        Value::TimestampMillis(ms) | Value::Long(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| CodecError::Decoding(format!("timestamp {} out of range", ms)))?,
        other => return Err(unexpected("timestamp", &other)),
    };

    let amount = match fields.take("amount")? {
        Value::Decimal(d) => decimal::decode(&Vec::<u8>::try_from(&d)?, AMOUNT_SCALE)?,
        Value::Bytes(bytes) => decimal::decode(&bytes, AMOUNT_SCALE)?,
        other => return Err(unexpected("amount", &other)),
    };

    let mut meta = Fields::from_record(fields.take("metadata")?, "Metadata")?;
    let location = match meta.take("location")? {
        Value::Union(_, inner) => match *inner {
            Value::Null => None,
            record => {
                let mut loc = Fields::from_record(record, "Location")?;
                Some(Location {
                    latitude: loc.double("latitude")?,
                    longitude: loc.double("longitude")?,
                })
            }
        },
        Value::Null => None,
        other => return Err(unexpected("location", &other)),
    };

    let metadata = Metadata {
        ip_address: meta.string("ipAddress")?,
        device_id: meta.string("deviceId")?,
        location,
        user_agent: meta.string("userAgent")?,
    };

    Ok(CanonicalTransaction {
        transaction_id: fields.string("transactionId")?,
        timestamp,
        amount,
        currency: fields.string("currency")?,
        customer_id: fields.string("customerId")?,
        customer_name: fields.string("customerName")?,
        source_id: fields.string("sourceId")?,
        source_type: fields.string("sourceType")?,
        destination_id: fields.string("destinationId")?,
        destination_type: fields.string("destinationType")?,
        transaction_type: fields.string("transactionType")?,
        metadata,
    })
}

pub mod avro;
pub mod decimal;
pub mod registry;

use thiserror::Error;

pub use avro::{AvroSerializer, TRANSACTION_SCHEMA};
pub use decimal::DecimalSource;
pub use registry::{SchemaError, SchemaRegistryClient};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),
}

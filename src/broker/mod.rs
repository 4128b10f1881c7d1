//! Broker client seam.
//!
//! `submit` enqueues synchronously so that messages sharing a key keep their
//! submission order; the returned future resolves once the broker acknowledges.

pub mod kafka;
pub mod memory;

use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

pub use kafka::KafkaBroker;
pub use memory::{AckBehavior, InMemoryBroker};

/// Resolves when the broker has acknowledged (or given up on) a message.
pub type Acknowledgement = BoxFuture<'static, Result<DeliveryReceipt, BrokerError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Where the broker stored an acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker refused message: {0}")]
    Rejected(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Delivery was cancelled before acknowledgement")]
    Cancelled,

    #[error("Broker client error: {0}")]
    Client(String),
}

pub trait MessageBroker: Send + Sync {
    fn submit(&self, message: OutboundMessage) -> Result<Acknowledgement, BrokerError>;

    /// Waits for every in-flight message to be acknowledged.
    fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;

    /// Confirms the broker is reachable. Blocks for at most `timeout`.
    fn probe(&self, _timeout: Duration) -> Result<(), BrokerError> {
        Ok(())
    }
}

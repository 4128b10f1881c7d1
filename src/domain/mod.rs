pub mod transaction;

pub use transaction::{
    CanonicalTransaction, Location, Metadata, MetadataRequest, TransactionRequest, AMOUNT_PRECISION,
    AMOUNT_SCALE,
};

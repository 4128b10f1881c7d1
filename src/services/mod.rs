pub mod ingestion;

pub use ingestion::{
    AdmissionPolicy, AdmitAll, BatchSummary, IngestionService, ProcessingCause, ProcessingError,
};

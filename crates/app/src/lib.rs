pub mod digest;
pub mod ingest;
pub mod record_set;

pub use digest::RunDigest;
pub use ingest::{discover_files, ingest, IngestError, IngestOutcome, DEFAULT_WORKERS};
pub use record_set::{RecordSet, RecordSetError};

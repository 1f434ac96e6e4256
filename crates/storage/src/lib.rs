pub mod db;
pub mod sink;

pub use db::{
    count_import_runs, count_records, create_db, create_memory_db, insert_import_run,
    load_adjustments, load_hits, upsert_adjustments, upsert_hits, DbPool, ImportRun,
    StorageError,
};
pub use sink::{MemorySink, RecordSink, SqliteSink};

use async_trait::async_trait;
use pressline_core::{AdjustmentRecord, HitRecord, SourceFamily};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::db::{self, DbPool, ImportRun, StorageError};

/// Where ingested records go. Writes are idempotent by natural key.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write_adjustments(
        &self,
        family: SourceFamily,
        records: &[AdjustmentRecord],
    ) -> Result<usize, StorageError>;

    async fn write_hits(&self, records: &[HitRecord]) -> Result<usize, StorageError>;

    async fn record_run(&self, run: &ImportRun) -> Result<(), StorageError>;
}

pub struct SqliteSink {
    pool: DbPool,
}

impl SqliteSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn write_adjustments(
        &self,
        family: SourceFamily,
        records: &[AdjustmentRecord],
    ) -> Result<usize, StorageError> {
        db::upsert_adjustments(&self.pool, family, records).await
    }

    async fn write_hits(&self, records: &[HitRecord]) -> Result<usize, StorageError> {
        db::upsert_hits(&self.pool, records).await
    }

    async fn record_run(&self, run: &ImportRun) -> Result<(), StorageError> {
        db::insert_import_run(&self.pool, run).await.map(|_| ())
    }
}

type AdjustmentKey = (String, String, usize, chrono::NaiveDate, String, Option<String>);
type HitKey = (String, String, usize, chrono::NaiveDate, String);

#[derive(Default)]
struct MemoryState {
    adjustments: BTreeMap<SourceFamily, BTreeMap<AdjustmentKey, AdjustmentRecord>>,
    hits: BTreeMap<HitKey, HitRecord>,
    runs: Vec<ImportRun>,
}

/// Keeps everything in memory with the same key semantics as the database.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn adjustments(&self, family: SourceFamily) -> Vec<AdjustmentRecord> {
        let state = self.state.lock().await;
        state
            .adjustments
            .get(&family)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn hits(&self) -> Vec<HitRecord> {
        self.state.lock().await.hits.values().cloned().collect()
    }

    pub async fn runs(&self) -> Vec<ImportRun> {
        self.state.lock().await.runs.clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write_adjustments(
        &self,
        family: SourceFamily,
        records: &[AdjustmentRecord],
    ) -> Result<usize, StorageError> {
        if family == SourceFamily::HitTracker {
            return Err(StorageError::NotAnAdjustmentFamily(family));
        }
        let mut state = self.state.lock().await;
        let table = state.adjustments.entry(family).or_default();
        for rec in records {
            let key = (
                rec.source_file.clone(),
                rec.sheet.clone(),
                rec.source_row,
                rec.date,
                rec.part_number.clone(),
                rec.operation.clone(),
            );
            table.insert(key, rec.clone());
        }
        Ok(records.len())
    }

    async fn write_hits(&self, records: &[HitRecord]) -> Result<usize, StorageError> {
        let mut state = self.state.lock().await;
        for rec in records {
            let key = (
                rec.source_file.clone(),
                rec.sheet.clone(),
                rec.source_row,
                rec.date,
                rec.machine.clone(),
            );
            state.hits.insert(key, rec.clone());
        }
        Ok(records.len())
    }

    async fn record_run(&self, run: &ImportRun) -> Result<(), StorageError> {
        self.state.lock().await.runs.push(run.clone());
        Ok(())
    }
}

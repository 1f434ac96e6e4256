use chrono::{DateTime, NaiveDate, Utc};
use pressline_core::{AdjustmentRecord, HitRecord, Money, SourceFamily};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Stored row {id} in {table} is unreadable: {message}")]
    Corrupt {
        table: &'static str,
        id: i64,
        message: String,
    },
    #[error("{0} sheets carry hits, not adjustments")]
    NotAnAdjustmentFamily(SourceFamily),
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// A private in-memory database, for tests and dry runs.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

fn table_for(family: SourceFamily) -> Result<&'static str, StorageError> {
    match family {
        SourceFamily::InventoryAdjustment => Ok("adjustments"),
        SourceFamily::ScrapLog => Ok("scrap_records"),
        SourceFamily::HitTracker => Err(StorageError::NotAnAdjustmentFamily(family)),
    }
}

// `operation` is part of the natural key and is stored as '' when absent:
// NULLs never collide in a UNIQUE constraint.
fn adjustment_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_file TEXT NOT NULL,
            sheet TEXT NOT NULL,
            source_row INTEGER NOT NULL,
            date TEXT NOT NULL,
            part_number TEXT NOT NULL,
            revision TEXT,
            operation TEXT NOT NULL DEFAULT '',
            quantity_delta TEXT NOT NULL,
            unit_cost TEXT NOT NULL,
            unit_cost_derived INTEGER NOT NULL DEFAULT 0,
            extended_cost_cents INTEGER NOT NULL,
            reason TEXT,
            reason_code INTEGER NOT NULL DEFAULT 0,
            location TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (source_file, sheet, source_row, date, part_number, operation)
        )
        "#
    )
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    for table in ["adjustments", "scrap_records"] {
        sqlx::query(&adjustment_table_sql(table))
            .execute(pool)
            .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_date_part ON {table} (date, part_number)"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hit_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_file TEXT NOT NULL,
            sheet TEXT NOT NULL,
            source_row INTEGER NOT NULL,
            date TEXT NOT NULL,
            shift INTEGER,
            machine TEXT NOT NULL,
            part_number TEXT,
            hits INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (source_file, sheet, source_row, date, machine)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_family TEXT NOT NULL,
            source_path TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            files_seen INTEGER NOT NULL,
            files_loaded INTEGER NOT NULL,
            files_unreadable INTEGER NOT NULL,
            records_written INTEGER NOT NULL,
            row_errors INTEGER NOT NULL,
            schema_errors INTEGER NOT NULL,
            interrupted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit row written once per ingest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: Option<i64>,
    pub source_family: SourceFamily,
    pub source_path: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_seen: usize,
    pub files_loaded: usize,
    pub files_unreadable: usize,
    pub records_written: usize,
    pub row_errors: usize,
    pub schema_errors: usize,
    pub interrupted: bool,
}

pub async fn insert_import_run(pool: &DbPool, run: &ImportRun) -> Result<i64, StorageError> {
    let result = sqlx::query(
        r#"INSERT INTO import_runs
           (source_family, source_path, started_at, finished_at, files_seen, files_loaded,
            files_unreadable, records_written, row_errors, schema_errors, interrupted)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(run.source_family.to_string())
    .bind(&run.source_path)
    .bind(run.started_at.to_rfc3339())
    .bind(run.finished_at.to_rfc3339())
    .bind(run.files_seen as i64)
    .bind(run.files_loaded as i64)
    .bind(run.files_unreadable as i64)
    .bind(run.records_written as i64)
    .bind(run.row_errors as i64)
    .bind(run.schema_errors as i64)
    .bind(run.interrupted as i64)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn count_import_runs(pool: &DbPool) -> Result<i64, StorageError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM import_runs")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Insert or refresh records by natural key. Returns the number of rows written.
pub async fn upsert_adjustments(
    pool: &DbPool,
    family: SourceFamily,
    records: &[AdjustmentRecord],
) -> Result<usize, StorageError> {
    let table = table_for(family)?;
    let sql = format!(
        r#"INSERT INTO {table}
           (source_file, sheet, source_row, date, part_number, revision, operation,
            quantity_delta, unit_cost, unit_cost_derived, extended_cost_cents,
            reason, reason_code, location)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT (source_file, sheet, source_row, date, part_number, operation) DO UPDATE SET
               revision = excluded.revision,
               quantity_delta = excluded.quantity_delta,
               unit_cost = excluded.unit_cost,
               unit_cost_derived = excluded.unit_cost_derived,
               extended_cost_cents = excluded.extended_cost_cents,
               reason = excluded.reason,
               reason_code = excluded.reason_code,
               location = excluded.location,
               updated_at = datetime('now')"#
    );

    let mut tx = pool.begin().await?;
    for rec in records {
        sqlx::query(&sql)
            .bind(&rec.source_file)
            .bind(&rec.sheet)
            .bind(rec.source_row as i64)
            .bind(rec.date.to_string())
            .bind(&rec.part_number)
            .bind(rec.revision.as_deref())
            .bind(rec.operation.as_deref().unwrap_or(""))
            .bind(rec.quantity_delta.to_string())
            .bind(rec.unit_cost.to_string())
            .bind(rec.unit_cost_derived as i64)
            .bind(rec.extended_cost.to_cents())
            .bind(rec.reason.as_deref())
            .bind(rec.reason_code as i64)
            .bind(rec.location.as_deref())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(records.len())
}

type AdjustmentRow = (
    i64,
    String,
    String,
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    i64,
    i64,
    Option<String>,
    i64,
    Option<String>,
);

pub async fn load_adjustments(
    pool: &DbPool,
    family: SourceFamily,
) -> Result<Vec<AdjustmentRecord>, StorageError> {
    let table = table_for(family)?;
    let rows = sqlx::query_as::<_, AdjustmentRow>(&format!(
        r#"SELECT id, source_file, sheet, source_row, date, part_number, revision, operation,
                  quantity_delta, unit_cost, unit_cost_derived, extended_cost_cents,
                  reason, reason_code, location
           FROM {table}
           ORDER BY date, source_file, sheet, source_row"#
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| adjustment_from_row(table, r)).collect()
}

fn adjustment_from_row(table: &'static str, r: AdjustmentRow) -> Result<AdjustmentRecord, StorageError> {
    let id = r.0;
    let corrupt = |message: String| StorageError::Corrupt { table, id, message };
    let date = NaiveDate::from_str(&r.4).map_err(|e| corrupt(format!("date '{}': {e}", r.4)))?;
    let quantity_delta =
        Decimal::from_str(&r.8).map_err(|e| corrupt(format!("quantity '{}': {e}", r.8)))?;
    let unit_cost = Decimal::from_str(&r.9).map_err(|e| corrupt(format!("unit cost '{}': {e}", r.9)))?;

    let record = AdjustmentRecord {
        date,
        part_number: r.5,
        revision: r.6,
        operation: Some(r.7).filter(|op| !op.is_empty()),
        quantity_delta,
        unit_cost,
        unit_cost_derived: r.10 != 0,
        extended_cost: Money::from_cents(r.11),
        reason: r.12,
        reason_code: u32::try_from(r.13).unwrap_or_default(),
        location: r.14,
        source_file: r.1,
        sheet: r.2,
        source_row: usize::try_from(r.3).unwrap_or_default(),
    };
    record.check().map_err(|e| corrupt(e.to_string()))?;
    Ok(record)
}

pub async fn upsert_hits(pool: &DbPool, records: &[HitRecord]) -> Result<usize, StorageError> {
    let mut tx = pool.begin().await?;
    for rec in records {
        sqlx::query(
            r#"INSERT INTO hit_records
               (source_file, sheet, source_row, date, shift, machine, part_number, hits)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (source_file, sheet, source_row, date, machine) DO UPDATE SET
                   shift = excluded.shift,
                   part_number = excluded.part_number,
                   hits = excluded.hits,
                   updated_at = datetime('now')"#,
        )
        .bind(&rec.source_file)
        .bind(&rec.sheet)
        .bind(rec.source_row as i64)
        .bind(rec.date.to_string())
        .bind(rec.shift.map(i64::from))
        .bind(&rec.machine)
        .bind(rec.part_number.as_deref())
        .bind(rec.hits)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(records.len())
}

pub async fn load_hits(pool: &DbPool) -> Result<Vec<HitRecord>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, String, String, i64, String, Option<i64>, String, Option<String>, i64)>(
        r#"SELECT id, source_file, sheet, source_row, date, shift, machine, part_number, hits
           FROM hit_records
           ORDER BY date, machine, source_file, source_row"#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let date = NaiveDate::from_str(&r.4).map_err(|e| StorageError::Corrupt {
                table: "hit_records",
                id: r.0,
                message: format!("date '{}': {e}", r.4),
            })?;
            Ok(HitRecord {
                date,
                shift: r.5.and_then(|s| u8::try_from(s).ok()),
                machine: r.6,
                part_number: r.7,
                hits: r.8,
                source_file: r.1,
                sheet: r.2,
                source_row: usize::try_from(r.3).unwrap_or_default(),
            })
        })
        .collect()
}

pub async fn count_records(pool: &DbPool, family: SourceFamily) -> Result<i64, StorageError> {
    let table = match family {
        SourceFamily::HitTracker => "hit_records",
        other => table_for(other)?,
    };
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_core::AdjustmentDraft;

    fn record(row: usize, qty: i64, cost_cents: i64, operation: Option<&str>) -> AdjustmentRecord {
        AdjustmentRecord::validate(AdjustmentDraft {
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            part_number: "1073874-00-G".to_string(),
            revision: Some("G".to_string()),
            operation: operation.map(str::to_string),
            quantity_delta: Decimal::from(qty),
            unit_cost: None,
            extended_cost: Some(Money::from_cents(cost_cents)),
            reason: Some("Container Audit".to_string()),
            location: None,
            source_file: "1-15-25.xlsx".to_string(),
            sheet: "Sheet1".to_string(),
            source_row: row,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let pool = create_memory_db().await.unwrap();
        let records = vec![record(1, -50, 25_000, Some("TUMBLE")), record(2, 50, 25_000, None)];

        upsert_adjustments(&pool, SourceFamily::InventoryAdjustment, &records)
            .await
            .unwrap();
        upsert_adjustments(&pool, SourceFamily::InventoryAdjustment, &records)
            .await
            .unwrap();

        assert_eq!(count_records(&pool, SourceFamily::InventoryAdjustment).await.unwrap(), 2);
        assert_eq!(count_records(&pool, SourceFamily::ScrapLog).await.unwrap(), 0);
        let loaded = load_adjustments(&pool, SourceFamily::InventoryAdjustment).await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn upsert_refreshes_changed_values() {
        let pool = create_memory_db().await.unwrap();
        upsert_adjustments(&pool, SourceFamily::ScrapLog, &[record(1, -5, 1_000, None)])
            .await
            .unwrap();
        upsert_adjustments(&pool, SourceFamily::ScrapLog, &[record(1, -5, 1_250, None)])
            .await
            .unwrap();
        let loaded = load_adjustments(&pool, SourceFamily::ScrapLog).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].extended_cost, Money::from_cents(1_250));
        assert_eq!(loaded[0].unit_cost, Decimal::new(25, 1));
    }

    #[tokio::test]
    async fn hits_round_trip_and_dedupe() {
        let pool = create_memory_db().await.unwrap();
        let hit = HitRecord::new(
            NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            Some(2),
            "PRESS 4".to_string(),
            None,
            1200,
            "3-7-25.2.xlsx".to_string(),
            "Hits".to_string(),
            1,
        )
        .unwrap();
        upsert_hits(&pool, &[hit.clone()]).await.unwrap();
        upsert_hits(&pool, &[hit.clone()]).await.unwrap();
        assert_eq!(load_hits(&pool).await.unwrap(), vec![hit]);
    }

    #[tokio::test]
    async fn hit_family_has_no_adjustment_table() {
        let pool = create_memory_db().await.unwrap();
        assert!(matches!(
            upsert_adjustments(&pool, SourceFamily::HitTracker, &[]).await,
            Err(StorageError::NotAnAdjustmentFamily(_))
        ));
    }

    #[tokio::test]
    async fn file_database_persists_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pressline.db");
        let now = Utc::now();
        let run = ImportRun {
            id: None,
            source_family: SourceFamily::ScrapLog,
            source_path: "/data/scrap".to_string(),
            started_at: now,
            finished_at: now,
            files_seen: 3,
            files_loaded: 2,
            files_unreadable: 1,
            records_written: 40,
            row_errors: 2,
            schema_errors: 0,
            interrupted: false,
        };
        {
            let pool = create_db(&path).await.unwrap();
            insert_import_run(&pool, &run).await.unwrap();
            pool.close().await;
        }
        let pool = create_db(&path).await.unwrap();
        assert_eq!(count_import_runs(&pool).await.unwrap(), 1);
    }
}

//! Record sets: what `reconcile` reads. Either a JSON export written by
//! `ingest --export` or the SQLite database `ingest --db` filled.

use pressline_core::{AdjustmentRecord, HitRecord, SourceFamily};
use pressline_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordSetError {
    #[error("Cannot read record set {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Record set {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Record set holds {found} records but {requested} was requested")]
    WrongSource {
        found: SourceFamily,
        requested: SourceFamily,
    },
    #[error("A database record set needs --source to pick a table")]
    SourceRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub source: SourceFamily,
    #[serde(default)]
    pub adjustments: Vec<AdjustmentRecord>,
    #[serde(default)]
    pub hits: Vec<HitRecord>,
}

impl RecordSet {
    pub fn new(source: SourceFamily) -> Self {
        Self {
            source,
            adjustments: Vec::new(),
            hits: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.adjustments.len() + self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_json(&self, path: &Path) -> Result<(), RecordSetError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| RecordSetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| RecordSetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_json(path: &Path) -> Result<Self, RecordSetError> {
        let content = std::fs::read_to_string(path).map_err(|source| RecordSetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| RecordSetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read one family's rows back out of an ingest database.
    pub async fn read_db(path: &Path, source: SourceFamily) -> Result<Self, RecordSetError> {
        // Connecting with mode=rwc would create an empty database.
        if !path.is_file() {
            return Err(RecordSetError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such database"),
            });
        }
        let pool = pressline_storage::create_db(path)
            .await
            .map_err(StorageError::from)?;
        let mut set = RecordSet::new(source);
        if source.yields_adjustments() {
            set.adjustments = pressline_storage::load_adjustments(&pool, source).await?;
        } else {
            set.hits = pressline_storage::load_hits(&pool).await?;
        }
        pool.close().await;
        Ok(set)
    }

    /// `.json` files are exports; anything else is treated as a database.
    pub async fn open(path: &Path, source: Option<SourceFamily>) -> Result<Self, RecordSetError> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            let set = Self::read_json(path)?;
            match source {
                Some(requested) if requested != set.source => Err(RecordSetError::WrongSource {
                    found: set.source,
                    requested,
                }),
                _ => Ok(set),
            }
        } else {
            let source = source.ok_or(RecordSetError::SourceRequired)?;
            Self::read_db(path, source).await
        }
    }
}

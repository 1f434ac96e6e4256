//! Ingest orchestration: fan files out to blocking workers, collect the
//! outcomes in path order, then persist through a `RecordSink`.

use chrono::Utc;
use pressline_import::{workbook, FileIngest, LoadError, SheetPipeline};
use pressline_storage::{RecordSink, StorageError};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::digest::RunDigest;
use crate::record_set::RecordSet;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to persist records: {0}")]
    Storage(#[from] StorageError),
}

pub struct IngestOutcome {
    pub digest: RunDigest,
    pub records: RecordSet,
}

/// Spreadsheet files under `root` (or `root` itself), sorted by path.
/// Office lock files (`~$...`) and hidden files are ignored.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let io_err = |source| IngestError::Io {
        path: root.to_path_buf(),
        source,
    };
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(root).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("~$") || name.starts_with('.') {
            tracing::debug!("Skipping lock or hidden file {name}");
            continue;
        }
        if path.is_file() && workbook::is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

type TaskResult = (PathBuf, Result<Result<FileIngest, LoadError>, JoinError>);

/// Read every file under `root` with at most `workers` files in flight.
///
/// When `shutdown` resolves, files not yet read are abandoned; whatever was
/// already collected is still persisted and the run is marked interrupted.
pub async fn ingest<F>(
    root: &Path,
    pipeline: SheetPipeline,
    sink: &dyn RecordSink,
    workers: usize,
    shutdown: F,
) -> Result<IngestOutcome, IngestError>
where
    F: Future<Output = ()>,
{
    let started_at = Utc::now();
    let family = pipeline.template().family;
    let files = discover_files(root)?;
    tracing::info!(
        "Ingesting {} {family} files from {} with template '{}'",
        files.len(),
        root.display(),
        pipeline.template().name
    );

    let pipeline = Arc::new(pipeline);
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    let mut digest = RunDigest::new(family, root.display().to_string(), files.len());

    for path in files {
        let pipeline = Arc::clone(&pipeline);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let read_path = path.clone();
            let result = tokio::task::spawn_blocking(move || pipeline.process_file(&read_path)).await;
            (path, result)
        });
    }

    let mut loaded: Vec<(PathBuf, FileIngest)> = Vec::new();
    let mut unreadable: Vec<(PathBuf, String)> = Vec::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown, if !digest.interrupted => {
                tracing::warn!("Interrupted; abandoning {} unfinished files", tasks.len());
                digest.interrupted = true;
                tasks.abort_all();
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok((path, Ok(Ok(file))))) => loaded.push((path, file)),
                Some(Ok((path, Ok(Err(e))))) => {
                    tracing::warn!("{e}");
                    unreadable.push((path, e.to_string()));
                }
                Some(Ok((path, Err(e)))) => {
                    tracing::error!("Reading {} panicked: {e}", path.display());
                    unreadable.push((path, e.to_string()));
                }
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => tracing::error!("Ingest task failed: {e}"),
            }
        }
    }

    // Completion order is arbitrary; everything downstream sees path order.
    loaded.sort_by(|a, b| a.0.cmp(&b.0));
    unreadable.sort();

    let mut records = RecordSet::new(family);
    for (_, file) in loaded {
        digest.add_file(&file);
        records.adjustments.extend(file.adjustments);
        records.hits.extend(file.hits);
    }
    for (path, reason) in unreadable {
        digest.add_unreadable(display_name(&path), reason);
    }

    digest.records_written = if family.yields_adjustments() {
        sink.write_adjustments(family, &records.adjustments).await?
    } else {
        sink.write_hits(&records.hits).await?
    };
    sink.record_run(&digest.to_import_run(started_at, Utc::now())).await?;

    tracing::info!(
        "Ingest of {} finished: {} of {} files loaded, {} records written{}",
        digest.source_path,
        digest.files_loaded,
        digest.files_seen,
        digest.records_written,
        if digest.interrupted { " (interrupted)" } else { "" }
    );
    Ok(IngestOutcome { digest, records })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

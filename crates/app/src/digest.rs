use chrono::{DateTime, Utc};
use pressline_core::SourceFamily;
use pressline_import::FileIngest;
use pressline_storage::ImportRun;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// End-of-run summary printed after every ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDigest {
    pub source_family: SourceFamily,
    pub source_path: String,
    pub files_seen: usize,
    pub files_loaded: usize,
    /// `(file, reason)` for every file that could not be opened at all.
    pub files_unreadable: Vec<(String, String)>,
    pub sheets_by_strategy: BTreeMap<String, usize>,
    pub schema_errors: Vec<String>,
    pub row_errors_by_kind: BTreeMap<String, usize>,
    pub records_read: usize,
    pub records_written: usize,
    pub zero_quantity_rows: usize,
    pub blank_rows: usize,
    pub footer_rows: usize,
    pub warnings: Vec<String>,
    pub interrupted: bool,
}

impl RunDigest {
    pub fn new(source_family: SourceFamily, source_path: impl Into<String>, files_seen: usize) -> Self {
        Self {
            source_family,
            source_path: source_path.into(),
            files_seen,
            files_loaded: 0,
            files_unreadable: Vec::new(),
            sheets_by_strategy: BTreeMap::new(),
            schema_errors: Vec::new(),
            row_errors_by_kind: BTreeMap::new(),
            records_read: 0,
            records_written: 0,
            zero_quantity_rows: 0,
            blank_rows: 0,
            footer_rows: 0,
            warnings: Vec::new(),
            interrupted: false,
        }
    }

    pub fn add_file(&mut self, ingest: &FileIngest) {
        self.files_loaded += 1;
        self.records_read += ingest.record_count();
        for sheet in &ingest.sheets {
            *self.sheets_by_strategy.entry(sheet.strategy.to_string()).or_default() += 1;
        }
        self.schema_errors
            .extend(ingest.schema_errors.iter().map(|e| format!("{}: {e}", ingest.source_file)));
        for err in &ingest.row_errors {
            *self.row_errors_by_kind.entry(err.kind.label().to_string()).or_default() += 1;
        }
        self.zero_quantity_rows += ingest.zero_quantity_rows;
        self.blank_rows += ingest.blank_rows;
        self.footer_rows += ingest.footer_rows;
        self.warnings.extend(ingest.warnings.iter().cloned());
    }

    pub fn add_unreadable(&mut self, file: impl Into<String>, reason: impl Into<String>) {
        self.files_unreadable.push((file.into(), reason.into()));
    }

    pub fn row_errors(&self) -> usize {
        self.row_errors_by_kind.values().sum()
    }

    /// A run fails only when a whole file could not be read.
    pub fn is_success(&self) -> bool {
        self.files_unreadable.is_empty()
    }

    pub fn to_import_run(&self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> ImportRun {
        ImportRun {
            id: None,
            source_family: self.source_family,
            source_path: self.source_path.clone(),
            started_at,
            finished_at,
            files_seen: self.files_seen,
            files_loaded: self.files_loaded,
            files_unreadable: self.files_unreadable.len(),
            records_written: self.records_written,
            row_errors: self.row_errors(),
            schema_errors: self.schema_errors.len(),
            interrupted: self.interrupted,
        }
    }
}

impl fmt::Display for RunDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ingest of {}", self.source_family, self.source_path)?;
        if self.interrupted {
            writeln!(f, "  INTERRUPTED: remaining files were not read")?;
        }
        writeln!(
            f,
            "  files: {} seen, {} loaded, {} unreadable",
            self.files_seen,
            self.files_loaded,
            self.files_unreadable.len()
        )?;
        for (file, reason) in &self.files_unreadable {
            writeln!(f, "    {file}: {reason}")?;
        }
        let sheets: Vec<String> = self
            .sheets_by_strategy
            .iter()
            .map(|(strategy, n)| format!("{n} by {strategy}"))
            .collect();
        writeln!(f, "  sheets bound: {}", if sheets.is_empty() { "none".to_string() } else { sheets.join(", ") })?;
        writeln!(f, "  schema errors: {}", self.schema_errors.len())?;
        for e in &self.schema_errors {
            writeln!(f, "    {e}")?;
        }
        write!(f, "  row errors: {}", self.row_errors())?;
        if !self.row_errors_by_kind.is_empty() {
            let kinds: Vec<String> = self
                .row_errors_by_kind
                .iter()
                .map(|(k, n)| format!("{k} {n}"))
                .collect();
            write!(f, " ({})", kinds.join(", "))?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "  records: {} read, {} written; {} zero-quantity, {} blank, {} footer rows skipped",
            self.records_read, self.records_written, self.zero_quantity_rows, self.blank_rows, self.footer_rows
        )?;
        writeln!(f, "  warnings: {}", self.warnings.len())?;
        for w in &self.warnings {
            writeln!(f, "    {w}")?;
        }
        Ok(())
    }
}

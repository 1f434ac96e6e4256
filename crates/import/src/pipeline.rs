use pressline_core::{AdjustmentRecord, HitRecord, SourceFamily};
use serde::Serialize;
use std::path::Path;

use crate::filename::FilenamePattern;
use crate::normalize::{normalize, normalize_hits, RowError, SheetMeta};
use crate::schema::{resolve, ResolutionStrategy, SchemaError};
use crate::template::SheetTemplate;
use crate::workbook::{self, LoadError, RawGrid};

/// How one sheet of a file was read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSummary {
    pub sheet: String,
    pub strategy: ResolutionStrategy,
    pub header_row: Option<usize>,
    pub records: usize,
    pub skipped: usize,
}

/// Everything read from one workbook.
#[derive(Debug, Clone, Default)]
pub struct FileIngest {
    pub source_file: String,
    pub adjustments: Vec<AdjustmentRecord>,
    pub hits: Vec<HitRecord>,
    pub sheets: Vec<SheetSummary>,
    pub row_errors: Vec<RowError>,
    pub schema_errors: Vec<SchemaError>,
    pub warnings: Vec<String>,
    pub zero_quantity_rows: usize,
    pub blank_rows: usize,
    pub footer_rows: usize,
}

impl FileIngest {
    pub fn record_count(&self) -> usize {
        self.adjustments.len() + self.hits.len()
    }
}

/// Orchestrates: load → pick sheets → resolve schema → normalize rows.
#[derive(Debug, Clone)]
pub struct SheetPipeline {
    template: SheetTemplate,
    filename_pattern: FilenamePattern,
}

impl SheetPipeline {
    pub fn new(template: SheetTemplate, filename_pattern: FilenamePattern) -> Self {
        Self {
            template,
            filename_pattern,
        }
    }

    pub fn template(&self) -> &SheetTemplate {
        &self.template
    }

    /// Read one workbook from disk. Only an unreadable container is an error;
    /// sheet and row problems are collected in the result.
    pub fn process_file(&self, path: &Path) -> Result<FileIngest, LoadError> {
        let book = workbook::load(path)?;
        let source_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let mut out = FileIngest {
            source_file: source_file.clone(),
            ..FileIngest::default()
        };
        for (sheet, reason) in &book.unreadable_sheets {
            out.warnings
                .push(format!("{source_file}: sheet '{sheet}' unreadable: {reason}"));
        }

        let name_meta = self.filename_pattern.parse(&source_file);
        if name_meta.is_none() {
            tracing::debug!("No date in file name '{source_file}'");
        }

        // Sheet names only choose among several sheets; a CSV or a
        // single-sheet workbook is always read.
        let single_sheet = book.sheet_names().len() == 1;
        let mut candidates = 0;
        for sheet in book.sheet_names() {
            if !single_sheet && !self.template.applies_to_sheet(sheet) {
                tracing::debug!("{source_file}: sheet '{sheet}' not in template '{}'", self.template.name);
                continue;
            }
            candidates += 1;
            let Some(grid) = book.sheet(sheet) else { continue };
            if is_empty(grid) {
                continue;
            }
            let meta = SheetMeta {
                source_file: source_file.clone(),
                sheet: sheet.to_string(),
                filename_date: name_meta.map(|m| m.date),
                shift: name_meta.and_then(|m| m.shift),
            };
            self.process_sheet(grid, &meta, &mut out);
        }
        if candidates == 0 && !book.sheet_names().is_empty() {
            let warning = format!(
                "{source_file}: no sheet matches template '{}' (expected one of [{}], found [{}])",
                self.template.name,
                self.template.sheet_name_candidates.join(", "),
                book.sheet_names().join(", ")
            );
            tracing::warn!("{warning}");
            out.warnings.push(warning);
        }

        tracing::info!(
            "{}: {} records from {} sheets ({} rows skipped)",
            out.source_file,
            out.record_count(),
            out.sheets.len(),
            out.row_errors.len()
        );
        Ok(out)
    }

    fn process_sheet(&self, grid: &RawGrid, meta: &SheetMeta, out: &mut FileIngest) {
        let binding = match resolve(&meta.sheet, grid, &self.template) {
            Ok(binding) => binding,
            Err(e) => {
                out.schema_errors.push(e);
                return;
            }
        };
        out.warnings.extend(binding.warnings.iter().cloned());

        let (records, skipped) = if self.template.family == SourceFamily::HitTracker {
            let sheet = normalize_hits(grid, &binding, &self.template, meta);
            out.zero_quantity_rows += sheet.zero_quantity_rows;
            out.blank_rows += sheet.blank_rows;
            out.footer_rows += sheet.footer_rows;
            let counts = (sheet.records.len(), sheet.skipped.len());
            out.hits.extend(sheet.records);
            out.row_errors.extend(sheet.skipped);
            counts
        } else {
            let sheet = normalize(grid, &binding, &self.template, meta);
            out.zero_quantity_rows += sheet.zero_quantity_rows;
            out.blank_rows += sheet.blank_rows;
            out.footer_rows += sheet.footer_rows;
            let counts = (sheet.records.len(), sheet.skipped.len());
            out.adjustments.extend(sheet.records);
            out.row_errors.extend(sheet.skipped);
            counts
        };

        out.sheets.push(SheetSummary {
            sheet: meta.sheet.clone(),
            strategy: binding.strategy,
            header_row: binding.header_row,
            records,
            skipped,
        });
    }
}

fn is_empty(grid: &RawGrid) -> bool {
    (0..grid.height()).all(|r| grid.row(r).iter().all(|c| c.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn pipeline(family: SourceFamily) -> SheetPipeline {
        SheetPipeline::new(SheetTemplate::default_for(family), FilenamePattern::default())
    }

    #[test]
    fn processes_adjustment_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-15-25.xlsx");

        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Adjustments").unwrap();
        sheet.write_string(0, 0, "Inventory Adjustments").unwrap();
        for (col, header) in ["Part Number - Revision", "Operation", "Quantity", "Extended Cost"]
            .iter()
            .enumerate()
        {
            sheet.write_string(2, col as u16, *header).unwrap();
        }
        sheet.write_string(3, 0, "1073874-00-G@G").unwrap();
        sheet.write_string(3, 1, "TUMBLE").unwrap();
        sheet.write_number(3, 2, -50.0).unwrap();
        sheet.write_number(3, 3, 250.0).unwrap();
        sheet.write_string(4, 0, "1073874-00-G@G").unwrap();
        sheet.write_string(4, 1, "MOVED TO NEXT OPERATION").unwrap();
        sheet.write_number(4, 2, 0.0).unwrap();
        sheet.write_string(5, 0, "Total").unwrap();
        sheet.write_number(5, 2, -50.0).unwrap();
        book.add_worksheet().set_name("Empty").unwrap();
        book.save(&path).unwrap();

        let out = pipeline(SourceFamily::InventoryAdjustment)
            .process_file(&path)
            .unwrap();
        assert_eq!(out.source_file, "1-15-25.xlsx");
        assert_eq!(out.adjustments.len(), 1);
        assert_eq!(out.zero_quantity_rows, 1);
        assert_eq!(out.footer_rows, 1);
        assert!(out.schema_errors.is_empty());
        assert_eq!(out.sheets.len(), 1);
        assert_eq!(out.sheets[0].header_row, Some(2));

        let rec = &out.adjustments[0];
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(rec.unit_cost, dec!(5));
        assert_eq!(rec.sheet, "Adjustments");
        assert_eq!(rec.source_row, 3);
    }

    #[test]
    fn schema_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2-3-25.csv");
        std::fs::write(&path, "Widget,Count\nA,1\n").unwrap();

        let out = pipeline(SourceFamily::InventoryAdjustment)
            .process_file(&path)
            .unwrap();
        assert_eq!(out.record_count(), 0);
        assert_eq!(out.schema_errors.len(), 1);
        assert_eq!(out.schema_errors[0].sheet, "2-3-25");
    }

    #[test]
    fn hit_tracker_csv_uses_filename_shift() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3-7-25.2.csv");
        std::fs::write(&path, "Press,Hits\nPress #4,1200\nPress 5,\n").unwrap();

        // The CSV's only sheet is "3-7-25.2", which is not a hit-tracker candidate.
        let out = pipeline(SourceFamily::HitTracker).process_file(&path).unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].machine, "PRESS 4");
        assert_eq!(out.hits[0].shift, Some(2));
        assert_eq!(out.zero_quantity_rows, 1);
    }

    #[test]
    fn workbook_without_candidate_sheet_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-31-25.xlsx");

        let mut book = rust_xlsxwriter::Workbook::new();
        for name in ["January", "February"] {
            let sheet = book.add_worksheet();
            sheet.set_name(name).unwrap();
            sheet.write_string(0, 0, "Part").unwrap();
            sheet.write_string(0, 1, "Qty").unwrap();
            sheet.write_string(0, 2, "Reason").unwrap();
            sheet.write_string(1, 0, "A-100").unwrap();
            sheet.write_number(1, 1, -5.0).unwrap();
            sheet.write_string(1, 2, "7 - Setup").unwrap();
        }
        book.save(&path).unwrap();

        let out = pipeline(SourceFamily::ScrapLog).process_file(&path).unwrap();
        assert_eq!(out.record_count(), 0);
        assert!(out.sheets.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("January, February"));
    }

    #[test]
    fn unreadable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-2-25.xlsx");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(pipeline(SourceFamily::ScrapLog).process_file(&path).is_err());
    }
}

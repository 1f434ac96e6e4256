//! Turns bound sheet rows into validated records. Rows that cannot become a
//! record are kept as `RowError`s; blank, footer and zero-quantity rows are
//! only counted.

use chrono::NaiveDate;
use pressline_core::{
    excel_serial_to_date, AdjustmentDraft, AdjustmentRecord, HitRecord, Money, RecordError,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::schema::FieldBinding;
use crate::template::{fields, FieldLocation, SheetTemplate};
use crate::util::parse_decimal;
use crate::workbook::{CellValue, RawGrid, EMPTY_CELL};

const QUANTITY_DP: u32 = 6;

/// Provenance shared by every row of one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetMeta {
    pub source_file: String,
    pub sheet: String,
    pub filename_date: Option<NaiveDate>,
    pub shift: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum RowErrorKind {
    #[error("no date in the row and none in the file name")]
    MissingDate,
    #[error("unreadable date '{0}'")]
    BadDate(String),
    #[error("{field} is not a number: '{value}'")]
    BadNumber { field: String, value: String },
    #[error("{0}")]
    Invalid(String),
}

impl RowErrorKind {
    /// Short name for tallies.
    pub fn label(&self) -> &'static str {
        match self {
            RowErrorKind::MissingDate => "missing_date",
            RowErrorKind::BadDate(_) => "bad_date",
            RowErrorKind::BadNumber { .. } => "bad_number",
            RowErrorKind::Invalid(_) => "invalid",
        }
    }
}

impl From<RecordError> for RowErrorKind {
    fn from(e: RecordError) -> Self {
        RowErrorKind::Invalid(e.to_string())
    }
}

/// A data row that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub source_file: String,
    pub sheet: String,
    /// 1-based, as shown by the spreadsheet.
    pub row: usize,
    pub kind: RowErrorKind,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] row {}: {}", self.source_file, self.sheet, self.row, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSheet<T> {
    pub records: Vec<T>,
    pub skipped: Vec<RowError>,
    pub zero_quantity_rows: usize,
    pub blank_rows: usize,
    pub footer_rows: usize,
}

impl<T> Default for NormalizedSheet<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
            zero_quantity_rows: 0,
            blank_rows: 0,
            footer_rows: 0,
        }
    }
}

/// Reads bound fields of one data row.
struct RowReader<'a> {
    grid: &'a RawGrid,
    binding: &'a FieldBinding,
    row: usize,
}

impl<'a> RowReader<'a> {
    fn cell(&self, field: &str) -> &'a CellValue {
        match self.binding.location(field) {
            Some(FieldLocation::Column { column }) => self.grid.get(self.row, column),
            Some(FieldLocation::Cell { row, column }) => self.grid.get(row, column),
            None => &EMPTY_CELL,
        }
    }

    fn text(&self, field: &str) -> Option<String> {
        self.cell(field).to_text()
    }

    /// True when every column-bound cell of the row is empty.
    fn is_blank(&self) -> bool {
        self.binding.locations.values().all(|loc| match loc {
            FieldLocation::Column { column } => self.grid.get(self.row, *column).is_empty(),
            FieldLocation::Cell { .. } => true,
        })
    }

    /// A footer label sits in the identifying column (part or machine).
    fn is_footer(&self, field: &str, prefixes: &[String]) -> bool {
        self.text(field).is_some_and(|t| {
            let lower = t.trim().to_lowercase();
            prefixes.iter().any(|p| lower.starts_with(&p.to_lowercase()))
        })
    }

    fn decimal(&self, field: &str) -> Result<Option<Decimal>, RowErrorKind> {
        let bad = |value: String| RowErrorKind::BadNumber {
            field: field.to_string(),
            value,
        };
        match self.cell(field) {
            CellValue::Empty => Ok(None),
            CellValue::Number(n) => Decimal::from_f64(*n)
                .map(|d| Some(d.round_dp(QUANTITY_DP).normalize()))
                .ok_or_else(|| bad(n.to_string())),
            CellValue::Text(s) if s.trim().is_empty() => Ok(None),
            CellValue::Text(s) => parse_decimal(s)
                .map(|d| Some(d.normalize()))
                .ok_or_else(|| bad(s.trim().to_string())),
            CellValue::Date(d) => Err(bad(d.to_string())),
        }
    }

    fn date(&self, fallback: Option<NaiveDate>) -> Result<NaiveDate, RowErrorKind> {
        match parse_date_cell(self.cell(fields::DATE))? {
            Some(date) => Ok(date),
            None => fallback.ok_or(RowErrorKind::MissingDate),
        }
    }
}

/// Normalize an inventory-adjustment or scrap-log sheet.
pub fn normalize(
    grid: &RawGrid,
    binding: &FieldBinding,
    template: &SheetTemplate,
    meta: &SheetMeta,
) -> NormalizedSheet<AdjustmentRecord> {
    let mut out = NormalizedSheet::default();

    for &row in &binding.data_rows {
        let reader = RowReader { grid, binding, row };
        if reader.is_blank() {
            out.blank_rows += 1;
            continue;
        }
        if reader.is_footer(fields::PART_NUMBER, &template.skip_row_prefixes) {
            out.footer_rows += 1;
            continue;
        }

        match adjustment_row(&reader, template, meta) {
            Ok(Some(record)) => out.records.push(record),
            Ok(None) => out.zero_quantity_rows += 1,
            Err(kind) => {
                let err = RowError {
                    source_file: meta.source_file.clone(),
                    sheet: meta.sheet.clone(),
                    row: row + 1,
                    kind,
                };
                tracing::debug!("Skipping {err}");
                out.skipped.push(err);
            }
        }
    }

    tracing::debug!(
        "{} [{}]: {} records, {} skipped, {} zero-quantity",
        meta.source_file,
        meta.sheet,
        out.records.len(),
        out.skipped.len(),
        out.zero_quantity_rows
    );
    out
}

fn adjustment_row(
    reader: &RowReader<'_>,
    template: &SheetTemplate,
    meta: &SheetMeta,
) -> Result<Option<AdjustmentRecord>, RowErrorKind> {
    let quantity = reader.decimal(fields::QUANTITY)?.unwrap_or(Decimal::ZERO);
    if quantity.is_zero() {
        return Ok(None);
    }

    let raw_part = reader.text(fields::PART_NUMBER).unwrap_or_default();
    let (part_number, revision) = split_revision(&raw_part, &template.part_revision_separators);
    let date = reader.date(meta.filename_date)?;
    let unit_cost = reader.decimal(fields::UNIT_COST)?;
    let extended_cost = reader.decimal(fields::EXTENDED_COST)?.map(Money::from_decimal);

    let draft = AdjustmentDraft {
        date,
        part_number,
        revision,
        operation: reader.text(fields::OPERATION),
        quantity_delta: quantity,
        unit_cost,
        extended_cost,
        reason: reader.text(fields::REASON),
        location: reader.text(fields::LOCATION),
        source_file: meta.source_file.clone(),
        sheet: meta.sheet.clone(),
        source_row: reader.row,
    };
    Ok(Some(AdjustmentRecord::validate(draft)?))
}

/// Normalize a hit-tracker sheet.
pub fn normalize_hits(
    grid: &RawGrid,
    binding: &FieldBinding,
    template: &SheetTemplate,
    meta: &SheetMeta,
) -> NormalizedSheet<HitRecord> {
    let mut out = NormalizedSheet::default();

    for &row in &binding.data_rows {
        let reader = RowReader { grid, binding, row };
        if reader.is_blank() {
            out.blank_rows += 1;
            continue;
        }
        if reader.is_footer(fields::MACHINE, &template.skip_row_prefixes) {
            out.footer_rows += 1;
            continue;
        }

        match hit_row(&reader, template, meta) {
            Ok(Some(record)) => out.records.push(record),
            Ok(None) => out.zero_quantity_rows += 1,
            Err(kind) => {
                let err = RowError {
                    source_file: meta.source_file.clone(),
                    sheet: meta.sheet.clone(),
                    row: row + 1,
                    kind,
                };
                tracing::debug!("Skipping {err}");
                out.skipped.push(err);
            }
        }
    }
    out
}

fn hit_row(
    reader: &RowReader<'_>,
    template: &SheetTemplate,
    meta: &SheetMeta,
) -> Result<Option<HitRecord>, RowErrorKind> {
    // A blank count means the press did not report; an explicit 0 is kept.
    let Some(count) = reader.decimal(fields::HITS)? else {
        return Ok(None);
    };
    let hits = count
        .trunc()
        .eq(&count)
        .then(|| count.to_i64())
        .flatten()
        .ok_or_else(|| RowErrorKind::BadNumber {
            field: fields::HITS.to_string(),
            value: count.to_string(),
        })?;

    let machine = reader
        .text(fields::MACHINE)
        .map(|m| canonical_machine_name(&m, &template.machine_aliases))
        .unwrap_or_default();
    let date = reader.date(meta.filename_date)?;
    let shift = match reader.decimal(fields::SHIFT)? {
        Some(s) => Some(s.to_u8().ok_or_else(|| RowErrorKind::BadNumber {
            field: fields::SHIFT.to_string(),
            value: s.to_string(),
        })?),
        None => meta.shift,
    };

    Ok(Some(HitRecord::new(
        date,
        shift,
        machine,
        reader.text(fields::PART_NUMBER),
        hits,
        meta.source_file.clone(),
        meta.sheet.clone(),
        reader.row,
    )?))
}

/// `"press #12"` and `"PRESS  12"` both become `"PRESS 12"`, then the alias
/// map is applied.
pub fn canonical_machine_name(raw: &str, aliases: &BTreeMap<String, String>) -> String {
    let collapse = |s: &str| {
        s.replace('#', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
    };
    let name = collapse(raw);
    aliases
        .iter()
        .find(|(alias, _)| collapse(alias) == name)
        .map(|(_, canonical)| collapse(canonical))
        .unwrap_or(name)
}

/// Split `"1073874-00-G@G"` into part and revision at the earliest separator.
pub fn split_revision(raw: &str, separators: &[String]) -> (String, Option<String>) {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    let hit = separators
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| lower.find(&s.to_ascii_lowercase()).map(|at| (at, s.len())))
        .min_by_key(|(at, _)| *at);

    match hit {
        Some((at, len)) => {
            let revision = raw[at + len..].trim();
            (
                raw[..at].trim().to_string(),
                (!revision.is_empty()).then(|| revision.to_string()),
            )
        }
        None => (raw.to_string(), None),
    }
}

/// `Ok(None)` for an empty cell; `Err` for a non-empty cell that is not a date.
pub fn parse_date_cell(cell: &CellValue) -> Result<Option<NaiveDate>, RowErrorKind> {
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::Date(d) => Ok(Some(*d)),
        CellValue::Number(n) => excel_serial_to_date(*n)
            .map(Some)
            .ok_or_else(|| RowErrorKind::BadDate(n.to_string())),
        CellValue::Text(s) if s.trim().is_empty() => Ok(None),
        CellValue::Text(s) => parse_text_date(s)
            .map(Some)
            .ok_or_else(|| RowErrorKind::BadDate(s.trim().to_string())),
    }
}

fn parse_text_date(s: &str) -> Option<NaiveDate> {
    let token = s.split_whitespace().next()?;
    let parts: Vec<&str> = token.split(['-', '/', '.']).collect();
    if parts.len() != 3 {
        return None;
    }
    let normalized = parts.join("/");
    let format = if parts[0].len() == 4 {
        "%Y/%m/%d"
    } else if parts[2].len() == 2 {
        "%m/%d/%y"
    } else if parts[2].len() == 4 {
        "%m/%d/%Y"
    } else {
        return None;
    };
    NaiveDate::parse_from_str(&normalized, format).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve;
    use pressline_core::SourceFamily;
    use rust_decimal_macros::dec;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn meta(filename_date: Option<NaiveDate>) -> SheetMeta {
        SheetMeta {
            source_file: "1-15-25.xlsx".to_string(),
            sheet: "Sheet1".to_string(),
            filename_date,
            shift: None,
        }
    }

    fn run(rows: Vec<Vec<CellValue>>, family: SourceFamily) -> NormalizedSheet<AdjustmentRecord> {
        let grid = RawGrid::new(rows);
        let template = SheetTemplate::default_for(family);
        let binding = resolve("Sheet1", &grid, &template).unwrap();
        normalize(&grid, &binding, &template, &meta(Some(ymd(2025, 1, 15))))
    }

    #[test]
    fn normalizes_tumble_adjustment() {
        let out = run(
            vec![
                vec![
                    text("Part Number - Revision"),
                    text("Operation"),
                    text("Quantity"),
                    text("Extended Cost"),
                ],
                vec![text("1073874-00-G@G"), text("TUMBLE"), num(-50.0), num(250.0)],
            ],
            SourceFamily::InventoryAdjustment,
        );
        assert!(out.skipped.is_empty());
        let rec = &out.records[0];
        assert_eq!(rec.part_number, "1073874-00-G");
        assert_eq!(rec.revision.as_deref(), Some("G"));
        assert_eq!(rec.operation.as_deref(), Some("TUMBLE"));
        assert_eq!(rec.quantity_delta, dec!(-50));
        assert_eq!(rec.unit_cost, dec!(5));
        assert!(rec.unit_cost_derived);
        assert_eq!(rec.extended_cost, Money::from_cents(25_000));
        assert_eq!(rec.date, ymd(2025, 1, 15));
        assert_eq!(rec.source_row, 1);
    }

    #[test]
    fn counts_blank_zero_and_footer_rows() {
        let out = run(
            vec![
                vec![text("Part"), text("Qty"), text("Cost")],
                vec![text("A-1"), num(0.0), num(10.0)],
                vec![text("A-2"), CellValue::Empty, num(10.0)],
                vec![],
                vec![text("B-7"), num(3.0), num(9.0)],
                vec![text("Grand Total"), num(3.0), num(19.0)],
            ],
            SourceFamily::InventoryAdjustment,
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.zero_quantity_rows, 2);
        assert_eq!(out.blank_rows, 1);
        assert_eq!(out.footer_rows, 1);
    }

    #[test]
    fn total_in_reason_column_is_not_a_footer() {
        let out = run(
            vec![
                vec![text("Reason"), text("Part"), text("Qty"), text("Cost")],
                vec![text("Total loss - die crash"), text("A-100"), num(-5.0), num(50.0)],
                vec![CellValue::Empty, text("Total"), num(-5.0), num(50.0)],
            ],
            SourceFamily::ScrapLog,
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].part_number, "A-100");
        assert_eq!(out.records[0].reason.as_deref(), Some("Total loss - die crash"));
        assert_eq!(out.footer_rows, 1);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn bad_quantity_and_date_become_row_errors() {
        let out = run(
            vec![
                vec![text("Date"), text("Part"), text("Qty")],
                vec![text("1/16/2025"), text("A-1"), text("lots")],
                vec![text("sometime"), text("A-2"), num(4.0)],
                vec![CellValue::Empty, CellValue::Empty, num(4.0)],
                vec![num(45673.0), text("A-3"), text("(2)")],
            ],
            SourceFamily::InventoryAdjustment,
        );
        assert_eq!(out.skipped.len(), 3);
        assert!(matches!(out.skipped[0].kind, RowErrorKind::BadNumber { .. }));
        assert_eq!(out.skipped[0].row, 2);
        assert_eq!(out.skipped[1].kind, RowErrorKind::BadDate("sometime".to_string()));
        assert_eq!(
            out.skipped[2].kind,
            RowErrorKind::Invalid(RecordError::MissingPartNumber.to_string())
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].date, ymd(2025, 1, 16));
        assert_eq!(out.records[0].quantity_delta, dec!(-2));
    }

    #[test]
    fn missing_date_without_filename_date() {
        let grid = RawGrid::new(vec![
            vec![text("Part"), text("Qty")],
            vec![text("A-1"), num(1.0)],
        ]);
        let template = SheetTemplate::default_for(SourceFamily::InventoryAdjustment);
        let binding = resolve("S", &grid, &template).unwrap();
        let out = normalize(&grid, &binding, &template, &meta(None));
        assert_eq!(out.skipped[0].kind, RowErrorKind::MissingDate);
    }

    #[test]
    fn scrap_reason_code_extracted() {
        let out = run(
            vec![
                vec![text("Part"), text("Scrap Qty"), text("Scrap Cost"), text("Reason Code")],
                vec![text("77-1"), num(12.0), num(36.0), text("7 - Setup")],
                vec![text("77-2"), num(2.0), num(6.0), num(40.0)],
            ],
            SourceFamily::ScrapLog,
        );
        assert_eq!(out.records[0].reason_code, 7);
        assert_eq!(out.records[1].reason_code, 40);
        assert_eq!(out.records[1].unit_cost, dec!(3));
    }

    #[test]
    fn hits_keep_explicit_zero_and_skip_blank() {
        let grid = RawGrid::new(vec![
            vec![text("Press #"), text("Hits"), text("Shift")],
            vec![text("press #12"), num(1500.0), num(1.0)],
            vec![text("Press 14"), num(0.0), CellValue::Empty],
            vec![text("PRESS 16"), CellValue::Empty, CellValue::Empty],
            vec![text("Press 18"), num(-4.0), CellValue::Empty],
            vec![text("Total"), num(1496.0), CellValue::Empty],
        ]);
        let mut template = SheetTemplate::default_for(SourceFamily::HitTracker);
        template
            .machine_aliases
            .insert("Press 14".to_string(), "Blanking 14".to_string());
        let binding = resolve("Hits", &grid, &template).unwrap();
        let mut m = meta(Some(ymd(2025, 1, 15)));
        m.shift = Some(2);
        let out = normalize_hits(&grid, &binding, &template, &m);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].machine, "PRESS 12");
        assert_eq!(out.records[0].shift, Some(1));
        assert_eq!(out.records[1].machine, "BLANKING 14");
        assert_eq!(out.records[1].hits, 0);
        assert_eq!(out.records[1].shift, Some(2));
        assert_eq!(out.zero_quantity_rows, 1);
        assert_eq!(out.footer_rows, 1);
        assert_eq!(
            out.skipped[0].kind,
            RowErrorKind::Invalid(RecordError::NegativeHits(-4).to_string())
        );
    }

    #[test]
    fn split_revision_variants() {
        let at = vec!["@".to_string()];
        assert_eq!(
            split_revision("1073874-00-G@G", &at),
            ("1073874-00-G".to_string(), Some("G".to_string()))
        );
        assert_eq!(split_revision("A-100", &at), ("A-100".to_string(), None));
        assert_eq!(split_revision("A-100@", &at), ("A-100".to_string(), None));
        let rev = vec![" rev ".to_string(), "@".to_string()];
        assert_eq!(
            split_revision("A-100 REV C", &rev),
            ("A-100".to_string(), Some("C".to_string()))
        );
    }

    #[test]
    fn text_dates() {
        assert_eq!(parse_text_date("2025-01-15"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_text_date("1/15/25"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_text_date("01/15/2025 06:30"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_text_date("1-15-2025"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_text_date("15/45/2025"), None);
        assert_eq!(parse_text_date("Jan 15"), None);
    }

    #[test]
    fn machine_names_canonicalize() {
        let aliases = BTreeMap::new();
        assert_eq!(canonical_machine_name(" press#7 ", &aliases), "PRESS 7");
        assert_eq!(canonical_machine_name("Press  7", &aliases), "PRESS 7");
    }
}

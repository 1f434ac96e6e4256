//! Locates the header row of a sheet and binds template fields to columns,
//! falling back to a template's fixed layout for sheets without headers.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::template::{FieldLocation, SheetTemplate};
use crate::util::{normalize_header, similarity};
use crate::workbook::RawGrid;

const SUGGESTION_MIN_SIMILARITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    HeaderMatched,
    FixedOffset,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStrategy::HeaderMatched => write!(f, "header"),
            ResolutionStrategy::FixedOffset => write!(f, "fixed"),
        }
    }
}

/// Where every bound field of one sheet is read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldBinding {
    pub sheet: String,
    pub strategy: ResolutionStrategy,
    pub header_row: Option<usize>,
    /// Fraction of the header row that matched template fields. 1.0 for fixed layouts.
    pub score: f64,
    pub data_rows: Vec<usize>,
    pub locations: BTreeMap<String, FieldLocation>,
    pub warnings: Vec<String>,
}

impl FieldBinding {
    pub fn location(&self, field: &str) -> Option<FieldLocation> {
        self.locations.get(field).copied()
    }

    pub fn is_bound(&self, field: &str) -> bool {
        self.locations.contains_key(field)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Sheet '{sheet}' is missing required fields: {}{}", .missing.join(", "), format_suggestions(.suggestions))]
pub struct SchemaError {
    pub sheet: String,
    pub missing: Vec<String>,
    /// `(field, header text)` pairs that look like near misses.
    pub suggestions: Vec<(String, String)>,
}

fn format_suggestions(suggestions: &[(String, String)]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let hints: Vec<String> = suggestions
        .iter()
        .map(|(field, header)| format!("'{header}' for {field}?"))
        .collect();
    format!(" (did you mean {})", hints.join(", "))
}

struct HeaderCandidate {
    row: usize,
    score: f64,
    columns: BTreeMap<String, usize>,
    duplicates: Vec<String>,
}

/// Bind `template`'s fields on one sheet.
pub fn resolve(sheet: &str, grid: &RawGrid, template: &SheetTemplate) -> Result<FieldBinding, SchemaError> {
    let scan_rows = template.header_scan_rows.min(grid.height());
    let candidates: Vec<HeaderCandidate> = (0..scan_rows)
        .filter_map(|row| score_row(grid, row, template))
        .filter(|c| c.score >= template.header_match_threshold)
        .collect();

    // Rows binding every required field beat rows that don't, then score,
    // then matched count. Remaining ties go to the earliest row.
    let mut warnings = Vec::new();
    let mut best: Option<&HeaderCandidate> = None;
    for candidate in &candidates {
        let better = best.map_or(true, |b| rank(template, candidate) > rank(template, b));
        if better {
            best = Some(candidate);
        }
    }

    if let Some(best) = best {
        if candidates.len() > 1 {
            let rows: Vec<String> = candidates.iter().map(|c| (c.row + 1).to_string()).collect();
            let msg = format!(
                "Multiple header rows qualify on sheet '{sheet}' (rows {}); using row {}",
                rows.join(", "),
                best.row + 1
            );
            tracing::warn!("{msg}");
            warnings.push(msg);
        }
        for field in &best.duplicates {
            let msg = format!("Duplicate header for '{field}' on sheet '{sheet}'; first column kept");
            tracing::warn!("{msg}");
            warnings.push(msg);
        }

        let missing = missing_required(template, |f| best.columns.contains_key(f));
        if missing.is_empty() {
            tracing::debug!(
                "Sheet '{}': header row {} matched {} fields (score {:.2})",
                sheet,
                best.row + 1,
                best.columns.len(),
                best.score
            );
            return Ok(FieldBinding {
                sheet: sheet.to_string(),
                strategy: ResolutionStrategy::HeaderMatched,
                header_row: Some(best.row),
                score: best.score,
                data_rows: (best.row + 1..grid.height()).collect(),
                locations: best
                    .columns
                    .iter()
                    .map(|(field, &column)| (field.clone(), FieldLocation::Column { column }))
                    .collect(),
                warnings,
            });
        }
        if template.fixed_layout.is_none() {
            return Err(schema_error(sheet, grid, template, scan_rows, missing));
        }
    }

    match &template.fixed_layout {
        Some(layout) => {
            let missing = missing_required(template, |f| layout.columns.contains_key(f));
            if !missing.is_empty() {
                return Err(schema_error(sheet, grid, template, scan_rows, missing));
            }
            let data_rows: Vec<usize> = if layout.rows.is_empty() {
                let end = layout
                    .data_end_row
                    .map_or(grid.height(), |end| (end + 1).min(grid.height()));
                (layout.data_start_row..end).collect()
            } else {
                layout.rows.iter().copied().filter(|&r| r < grid.height()).collect()
            };
            tracing::debug!(
                "Sheet '{}': using fixed layout of template '{}' ({} data rows)",
                sheet,
                template.name,
                data_rows.len()
            );
            Ok(FieldBinding {
                sheet: sheet.to_string(),
                strategy: ResolutionStrategy::FixedOffset,
                header_row: None,
                score: 1.0,
                data_rows,
                locations: layout.columns.clone(),
                warnings,
            })
        }
        None => {
            let missing = missing_required(template, |_| false);
            Err(schema_error(sheet, grid, template, scan_rows, missing))
        }
    }
}

fn score_row(grid: &RawGrid, row: usize, template: &SheetTemplate) -> Option<HeaderCandidate> {
    let mut columns: BTreeMap<String, usize> = BTreeMap::new();
    let mut duplicates = Vec::new();
    let mut non_empty = 0usize;

    for (column, cell) in grid.row(row).iter().enumerate() {
        let Some(text) = cell.to_text() else { continue };
        non_empty += 1;
        let header = normalize_header(&text);
        if let Some(spec) = template.fields.iter().find(|f| f.matches(&header)) {
            if columns.contains_key(&spec.name) {
                if !duplicates.contains(&spec.name) {
                    duplicates.push(spec.name.clone());
                }
            } else {
                columns.insert(spec.name.clone(), column);
            }
        }
    }

    if columns.is_empty() {
        return None;
    }
    let denominator = template.fields.len().min(non_empty).max(1);
    Some(HeaderCandidate {
        row,
        score: columns.len() as f64 / denominator as f64,
        columns,
        duplicates,
    })
}

fn rank(template: &SheetTemplate, candidate: &HeaderCandidate) -> (bool, f64, usize) {
    let complete = missing_required(template, |f| candidate.columns.contains_key(f)).is_empty();
    (complete, candidate.score, candidate.columns.len())
}

fn missing_required(template: &SheetTemplate, bound: impl Fn(&str) -> bool) -> Vec<String> {
    template
        .required_fields()
        .filter(|f| !bound(&f.name))
        .map(|f| f.name.clone())
        .collect()
}

fn schema_error(
    sheet: &str,
    grid: &RawGrid,
    template: &SheetTemplate,
    scan_rows: usize,
    missing: Vec<String>,
) -> SchemaError {
    let headers: Vec<String> = (0..scan_rows)
        .flat_map(|row| grid.row(row).iter().filter_map(|c| c.to_text()))
        .collect();

    let mut suggestions = Vec::new();
    for field in &missing {
        let Some(spec) = template.field(field) else { continue };
        let names: Vec<String> = std::iter::once(spec.name.as_str())
            .chain(spec.synonyms.iter().map(String::as_str))
            .map(normalize_header)
            .collect();
        let best = headers
            .iter()
            .map(|h| {
                let normalized = normalize_header(h);
                let score = names
                    .iter()
                    .map(|n| similarity(&normalized, n))
                    .fold(0.0f32, f32::max);
                (h, score)
            })
            .filter(|(_, score)| *score >= SUGGESTION_MIN_SIMILARITY)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((header, _)) = best {
            suggestions.push((field.clone(), header.clone()));
        }
    }

    let err = SchemaError {
        sheet: sheet.to_string(),
        missing,
        suggestions,
    };
    tracing::warn!("{err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{fields, FixedLayout};
    use crate::workbook::CellValue;
    use pressline_core::SourceFamily;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn grid(rows: Vec<Vec<CellValue>>) -> RawGrid {
        RawGrid::new(rows)
    }

    fn inventory() -> SheetTemplate {
        SheetTemplate::default_for(SourceFamily::InventoryAdjustment)
    }

    #[test]
    fn finds_header_below_title_rows() {
        let g = grid(vec![
            vec![text("Toledo Tool & Die")],
            vec![text("Inventory adjustments, January")],
            vec![
                text("Part Number - Revision"),
                text("Operation"),
                text("Quantity"),
                text("Extended Cost"),
            ],
            vec![text("1073874-00-G@G"), text("TUMBLE"), CellValue::Number(-50.0), CellValue::Number(250.0)],
        ]);
        let binding = resolve("Sheet1", &g, &inventory()).unwrap();
        assert_eq!(binding.strategy, ResolutionStrategy::HeaderMatched);
        assert_eq!(binding.header_row, Some(2));
        assert_eq!(binding.data_rows, vec![3]);
        assert_eq!(binding.location(fields::PART_NUMBER), Some(FieldLocation::Column { column: 0 }));
        assert_eq!(binding.location(fields::EXTENDED_COST), Some(FieldLocation::Column { column: 3 }));
        assert!(!binding.is_bound(fields::UNIT_COST));
        assert_eq!(binding.score, 1.0);
        assert!(binding.warnings.is_empty());
    }

    #[test]
    fn complete_header_beats_title_cell() {
        let g = grid(vec![
            vec![text("Part")],
            vec![text("Part Number"), text("Qty"), text("Ext Cost")],
            vec![text("A-1"), CellValue::Number(3.0), CellValue::Number(9.0)],
        ]);
        let binding = resolve("Adj", &g, &inventory()).unwrap();
        assert_eq!(binding.header_row, Some(1));
        assert_eq!(binding.data_rows, vec![2]);
    }

    #[test]
    fn duplicate_header_keeps_first_column() {
        let g = grid(vec![vec![text("Part"), text("Qty"), text("Quantity"), text("Cost")]]);
        let binding = resolve("S", &g, &inventory()).unwrap();
        assert_eq!(binding.location(fields::QUANTITY), Some(FieldLocation::Column { column: 1 }));
        assert_eq!(binding.warnings.len(), 1);
        assert!(binding.warnings[0].contains("quantity"));
    }

    #[test]
    fn ambiguous_header_rows_warn_and_first_wins() {
        let g = grid(vec![
            vec![text("Part"), text("Qty")],
            vec![text("Part"), text("Qty")],
        ]);
        let binding = resolve("S", &g, &inventory()).unwrap();
        assert_eq!(binding.header_row, Some(0));
        assert!(binding.warnings.iter().any(|w| w.contains("Multiple header rows")));
    }

    #[test]
    fn missing_required_field_suggests_near_miss() {
        let g = grid(vec![vec![text("Part Number"), text("Quantiy"), text("Cost")]]);
        let err = resolve("S", &g, &inventory()).unwrap_err();
        assert_eq!(err.missing, vec![fields::QUANTITY.to_string()]);
        assert_eq!(err.suggestions, vec![(fields::QUANTITY.to_string(), "Quantiy".to_string())]);
        assert!(err.to_string().contains("did you mean 'Quantiy' for quantity?"));
    }

    #[test]
    fn no_header_without_layout_is_error() {
        let g = grid(vec![vec![CellValue::Number(1.0), CellValue::Number(2.0)]]);
        let err = resolve("S", &g, &inventory()).unwrap_err();
        assert_eq!(err.missing, vec![fields::PART_NUMBER.to_string(), fields::QUANTITY.to_string()]);
    }

    #[test]
    fn falls_back_to_fixed_layout() {
        let mut template = SheetTemplate::default_for(SourceFamily::HitTracker);
        template.fixed_layout = Some(FixedLayout {
            rows: vec![],
            data_start_row: 2,
            data_end_row: Some(3),
            columns: [
                (fields::MACHINE.to_string(), FieldLocation::Column { column: 0 }),
                (fields::HITS.to_string(), FieldLocation::Column { column: 2 }),
                (fields::DATE.to_string(), FieldLocation::Cell { row: 0, column: 3 }),
            ]
            .into_iter()
            .collect(),
        });
        let g = grid(vec![
            vec![text("PRESS BOARD"), CellValue::Empty, CellValue::Empty, text("1/15/2025")],
            vec![],
            vec![text("P-12"), CellValue::Empty, CellValue::Number(1200.0)],
            vec![text("P-14"), CellValue::Empty, CellValue::Number(900.0)],
            vec![text("notes")],
        ]);
        let binding = resolve("Board", &g, &template).unwrap();
        assert_eq!(binding.strategy, ResolutionStrategy::FixedOffset);
        assert_eq!(binding.data_rows, vec![2, 3]);
        assert_eq!(binding.header_row, None);
        assert_eq!(
            binding.location(fields::DATE),
            Some(FieldLocation::Cell { row: 0, column: 3 })
        );
    }

    #[test]
    fn explicit_layout_rows_clip_to_grid() {
        let mut template = SheetTemplate::default_for(SourceFamily::HitTracker);
        template.fixed_layout = Some(FixedLayout {
            rows: vec![1, 40],
            data_start_row: 0,
            data_end_row: None,
            columns: [
                (fields::MACHINE.to_string(), FieldLocation::Column { column: 0 }),
                (fields::HITS.to_string(), FieldLocation::Column { column: 1 }),
            ]
            .into_iter()
            .collect(),
        });
        let g = grid(vec![vec![], vec![text("P-1"), CellValue::Number(5.0)]]);
        assert_eq!(resolve("B", &g, &template).unwrap().data_rows, vec![1]);
    }
}

//! Declarative sheet templates: which sheets of a workbook to read, which
//! fields to bind, what the headers may be called, and, for legacy sheets
//! with no header row, exactly where each field lives.

use pressline_core::SourceFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::util::normalize_header;

/// Logical field names shared by templates, the resolver and the normalizer.
pub mod fields {
    pub const DATE: &str = "date";
    pub const PART_NUMBER: &str = "part_number";
    pub const OPERATION: &str = "operation";
    pub const QUANTITY: &str = "quantity";
    pub const UNIT_COST: &str = "unit_cost";
    pub const EXTENDED_COST: &str = "extended_cost";
    pub const REASON: &str = "reason";
    pub const LOCATION: &str = "location";
    pub const MACHINE: &str = "machine";
    pub const HITS: &str = "hits";
    pub const SHIFT: &str = "shift";
}

pub const DEFAULT_HEADER_SCAN_ROWS: usize = 5;
pub const DEFAULT_HEADER_MATCH_THRESHOLD: f64 = 0.6;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to parse template TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to write template TOML: {0}")]
    Write(#[from] toml::ser::Error),
    #[error("Template '{template}' is invalid: {message}")]
    Invalid { template: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl FieldSpec {
    pub fn required(name: &str, synonyms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn optional(name: &str, synonyms: &[&str]) -> Self {
        Self {
            required: false,
            ..Self::required(name, synonyms)
        }
    }

    /// `header` must already be passed through `normalize_header`.
    pub fn matches(&self, header: &str) -> bool {
        normalize_header(&self.name) == header
            || self.synonyms.iter().any(|s| normalize_header(s) == header)
    }
}

/// Where a bound field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldLocation {
    /// A single sheet-wide cell, e.g. a date typed in the title block.
    Cell { row: usize, column: usize },
    /// A column read on every data row.
    Column { column: usize },
}

/// Explicit coordinates for sheets that carry no header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedLayout {
    /// Explicit data rows (0-indexed). Takes precedence over the range.
    #[serde(default)]
    pub rows: Vec<usize>,
    #[serde(default)]
    pub data_start_row: usize,
    #[serde(default)]
    pub data_end_row: Option<usize>,
    pub columns: BTreeMap<String, FieldLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTemplate {
    pub name: String,
    pub family: SourceFamily,
    /// Sheet names to read, compared case-insensitively. Empty reads every sheet.
    #[serde(default)]
    pub sheet_name_candidates: Vec<String>,
    pub fields: Vec<FieldSpec>,
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,
    #[serde(default = "default_header_match_threshold")]
    pub header_match_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_layout: Option<FixedLayout>,
    /// Separators splitting `part_number` into part and revision.
    #[serde(default)]
    pub part_revision_separators: Vec<String>,
    /// Rows whose part or machine text starts with one of these are footers.
    #[serde(default = "default_skip_row_prefixes")]
    pub skip_row_prefixes: Vec<String>,
    /// Machine name spellings mapped to the canonical plant name.
    #[serde(default)]
    pub machine_aliases: BTreeMap<String, String>,
}

fn default_header_scan_rows() -> usize {
    DEFAULT_HEADER_SCAN_ROWS
}

fn default_header_match_threshold() -> f64 {
    DEFAULT_HEADER_MATCH_THRESHOLD
}

fn default_skip_row_prefixes() -> Vec<String> {
    vec!["total".to_string(), "grand total".to_string()]
}

const PART_SYNONYMS: &[&str] = &[
    "part", "part no", "part no.", "part #", "part num", "part number - revision",
    "part number-revision", "item", "item number", "item no",
];
const DATE_SYNONYMS: &[&str] = &[
    "transaction date", "adjustment date", "scrap date", "posted", "posted date", "day",
];
const OPERATION_SYNONYMS: &[&str] = &["op", "oper", "operation code", "op code", "sequence"];
const REASON_SYNONYMS: &[&str] = &[
    "reason code", "scrap code", "adjustment reason", "reason description", "code", "scrap reason",
];
const LOCATION_SYNONYMS: &[&str] = &["workcenter", "work center", "wc", "department", "dept"];
const UNIT_COST_SYNONYMS: &[&str] = &["unit cost", "cost each", "std cost", "standard cost", "unit price"];

impl SheetTemplate {
    pub fn default_for(family: SourceFamily) -> Self {
        use fields::*;

        let (name, candidates, specs, separators) = match family {
            SourceFamily::InventoryAdjustment => (
                "inventory-adjustment",
                vec![],
                vec![
                    FieldSpec::optional(DATE, DATE_SYNONYMS),
                    FieldSpec::required(PART_NUMBER, PART_SYNONYMS),
                    FieldSpec::optional(OPERATION, OPERATION_SYNONYMS),
                    FieldSpec::required(
                        QUANTITY,
                        &["qty", "qty adjusted", "adjustment qty", "adj qty", "quantity change", "change"],
                    ),
                    FieldSpec::optional(UNIT_COST, UNIT_COST_SYNONYMS),
                    FieldSpec::optional(
                        EXTENDED_COST,
                        &["ext cost", "extended value", "total cost", "cost", "value", "amount"],
                    ),
                    FieldSpec::optional(REASON, REASON_SYNONYMS),
                    FieldSpec::optional(LOCATION, LOCATION_SYNONYMS),
                ],
                vec!["@".to_string()],
            ),
            SourceFamily::ScrapLog => (
                "scrap-log",
                vec!["Scrap".to_string(), "Scrap Log".to_string(), "Sheet1".to_string()],
                vec![
                    FieldSpec::optional(DATE, DATE_SYNONYMS),
                    FieldSpec::required(PART_NUMBER, PART_SYNONYMS),
                    FieldSpec::optional(OPERATION, OPERATION_SYNONYMS),
                    FieldSpec::required(
                        QUANTITY,
                        &["qty", "scrap qty", "scrap quantity", "pcs", "pieces", "qty scrapped"],
                    ),
                    FieldSpec::optional(UNIT_COST, UNIT_COST_SYNONYMS),
                    FieldSpec::optional(
                        EXTENDED_COST,
                        &["scrap cost", "ext cost", "total cost", "cost", "scrap $", "scrap value"],
                    ),
                    FieldSpec::required(REASON, REASON_SYNONYMS),
                    FieldSpec::optional(LOCATION, LOCATION_SYNONYMS),
                ],
                vec!["@".to_string()],
            ),
            SourceFamily::HitTracker => (
                "hit-tracker",
                vec!["Hits".to_string(), "Hit Tracker".to_string(), "Sheet1".to_string()],
                vec![
                    FieldSpec::optional(DATE, DATE_SYNONYMS),
                    FieldSpec::required(MACHINE, &["press", "press #", "machine name", "press no", "line"]),
                    FieldSpec::required(HITS, &["total hits", "hit count", "strokes", "count", "hits total"]),
                    FieldSpec::optional(SHIFT, &["shift #", "shift no"]),
                    FieldSpec::optional(PART_NUMBER, PART_SYNONYMS),
                ],
                vec![],
            ),
        };

        SheetTemplate {
            name: name.to_string(),
            family,
            sheet_name_candidates: candidates,
            fields: specs,
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            header_match_threshold: DEFAULT_HEADER_MATCH_THRESHOLD,
            fixed_layout: None,
            part_revision_separators: separators,
            skip_row_prefixes: default_skip_row_prefixes(),
            machine_aliases: BTreeMap::new(),
        }
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, TemplateError> {
        let template: SheetTemplate = toml::from_str(toml_content)?;
        template.validate()?;
        Ok(template)
    }

    pub fn to_toml(&self) -> Result<String, TemplateError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |message: String| TemplateError::Invalid {
            template: self.name.clone(),
            message,
        };
        if self.fields.is_empty() {
            return Err(invalid("no fields declared".to_string()));
        }
        if !(0.0..=1.0).contains(&self.header_match_threshold) || self.header_match_threshold == 0.0 {
            return Err(invalid(format!(
                "header_match_threshold must be in (0, 1], got {}",
                self.header_match_threshold
            )));
        }
        if let Some(layout) = &self.fixed_layout {
            for field in layout.columns.keys() {
                if self.field(field).is_none() {
                    return Err(invalid(format!("fixed layout names unknown field '{field}'")));
                }
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Whether `sheet_name` should be read with this template.
    pub fn applies_to_sheet(&self, sheet_name: &str) -> bool {
        self.sheet_name_candidates.is_empty()
            || self
                .sheet_name_candidates
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(sheet_name.trim()))
    }
}

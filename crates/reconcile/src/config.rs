use pressline_core::SourceFamily;
use pressline_import::import::create_pipeline;
use pressline_import::{FilenamePattern, SheetPipeline, SheetTemplate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::movement::{default_movement_rules, MatchType, MovementRule, MovementVocabulary};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Plant-level settings shared by ingestion and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(alias = "plannedCodes")]
    pub planned_codes: Vec<u32>,
    #[serde(default = "default_pair_tolerance_percent", alias = "pairTolerancePercent")]
    pub pair_tolerance_percent: Decimal,
    #[serde(default = "default_pair_tolerance_absolute", alias = "pairToleranceAbsolute")]
    pub pair_tolerance_absolute: Decimal,
    #[serde(default = "default_header_match_threshold", alias = "headerMatchThreshold")]
    pub header_match_threshold: f64,
    #[serde(default = "default_header_scan_rows", alias = "headerScanRows")]
    pub header_scan_rows: usize,
    #[serde(default, alias = "filenamePattern", skip_serializing_if = "Option::is_none")]
    pub filename_pattern: Option<String>,
    /// Per-family sheet names, replacing the template defaults.
    #[serde(default, alias = "sheetNameCandidates")]
    pub sheet_name_candidates: BTreeMap<SourceFamily, Vec<String>>,
    #[serde(default = "default_movement_rules", alias = "movementRules")]
    pub movement_rules: Vec<MovementRule>,
    #[serde(default = "default_discrepancy_percent", alias = "discrepancyPercentThreshold")]
    pub discrepancy_percent_threshold: Decimal,
    #[serde(default, alias = "discrepancyAbsoluteThreshold")]
    pub discrepancy_absolute_threshold: Decimal,
    #[serde(default = "default_top_n", alias = "topN")]
    pub top_n: usize,
    /// Whole-template overrides keyed by source family.
    #[serde(default)]
    pub templates: BTreeMap<SourceFamily, SheetTemplate>,
}

fn default_pair_tolerance_percent() -> Decimal {
    Decimal::new(1, 1)
}

fn default_pair_tolerance_absolute() -> Decimal {
    Decimal::ONE
}

fn default_header_match_threshold() -> f64 {
    pressline_import::template::DEFAULT_HEADER_MATCH_THRESHOLD
}

fn default_header_scan_rows() -> usize {
    pressline_import::template::DEFAULT_HEADER_SCAN_ROWS
}

fn default_discrepancy_percent() -> Decimal {
    Decimal::TEN
}

fn default_top_n() -> usize {
    10
}

impl ReconciliationConfig {
    /// Defaults for everything except the planned codes, which every plant
    /// must state.
    pub fn with_planned_codes(planned_codes: Vec<u32>) -> Self {
        Self {
            planned_codes,
            pair_tolerance_percent: default_pair_tolerance_percent(),
            pair_tolerance_absolute: default_pair_tolerance_absolute(),
            header_match_threshold: default_header_match_threshold(),
            header_scan_rows: default_header_scan_rows(),
            filename_pattern: None,
            sheet_name_candidates: BTreeMap::new(),
            movement_rules: default_movement_rules(),
            discrepancy_percent_threshold: default_discrepancy_percent(),
            discrepancy_absolute_threshold: Decimal::ZERO,
            top_n: default_top_n(),
            templates: BTreeMap::new(),
        }
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ReconciliationConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.planned_codes.is_empty() {
            return invalid("planned_codes must list at least one reason code".to_string());
        }
        if self.pair_tolerance_percent.is_sign_negative() || self.pair_tolerance_absolute.is_sign_negative() {
            return invalid("pair tolerances must not be negative".to_string());
        }
        if self.discrepancy_percent_threshold.is_sign_negative()
            || self.discrepancy_absolute_threshold.is_sign_negative()
        {
            return invalid("discrepancy thresholds must not be negative".to_string());
        }
        if !(self.header_match_threshold > 0.0 && self.header_match_threshold <= 1.0) {
            return invalid(format!(
                "header_match_threshold must be in (0, 1], got {}",
                self.header_match_threshold
            ));
        }
        if self.header_scan_rows == 0 {
            return invalid("header_scan_rows must be at least 1".to_string());
        }
        if self.top_n == 0 {
            return invalid("top_n must be at least 1".to_string());
        }
        if let Some(pattern) = &self.filename_pattern {
            FilenamePattern::new(pattern).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        for rule in &self.movement_rules {
            if let MatchType::Regex = rule.match_type {
                regex::Regex::new(&rule.pattern).map_err(|e| {
                    ConfigError::Invalid(format!("movement rule '{}': {e}", rule.name))
                })?;
            }
        }
        for (family, template) in &self.templates {
            if template.family != *family {
                return invalid(format!(
                    "template '{}' is declared for {} but filed under {}",
                    template.name, template.family, family
                ));
            }
            template
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// The template used for `family`: an explicit override as written, or
    /// the default with the plant-wide header and sheet settings applied.
    pub fn template_for(&self, family: SourceFamily) -> SheetTemplate {
        if let Some(template) = self.templates.get(&family) {
            return template.clone();
        }
        let mut template = SheetTemplate::default_for(family);
        template.header_match_threshold = self.header_match_threshold;
        template.header_scan_rows = self.header_scan_rows;
        if let Some(candidates) = self.sheet_name_candidates.get(&family) {
            template.sheet_name_candidates = candidates.clone();
        }
        template
    }

    /// The ingest pipeline for `family` under this configuration.
    pub fn pipeline_for(&self, family: SourceFamily) -> Result<SheetPipeline, ConfigError> {
        create_pipeline(self.template_for(family), self.filename_pattern.as_deref())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn movement_vocabulary(&self) -> MovementVocabulary {
        MovementVocabulary::new(self.movement_rules.clone())
    }
}

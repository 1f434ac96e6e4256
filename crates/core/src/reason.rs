use serde::{Deserialize, Serialize};
use std::fmt;

/// Code assigned to reasons without a leading number.
pub const UNCLASSIFIED_REASON: u32 = 0;

/// Leading digits of a free-text reason: `"12 - Die setup"` and `"12A"` are
/// both code 12. Text without leading digits is unclassified.
pub fn reason_code(text: &str) -> u32 {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(UNCLASSIFIED_REASON)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapClass {
    Planned,
    Unplanned,
}

impl ScrapClass {
    pub fn of(code: u32, planned_codes: &[u32]) -> Self {
        if planned_codes.contains(&code) {
            ScrapClass::Planned
        } else {
            ScrapClass::Unplanned
        }
    }
}

impl fmt::Display for ScrapClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapClass::Planned => write!(f, "planned"),
            ScrapClass::Unplanned => write!(f, "unplanned"),
        }
    }
}

/// The spreadsheet families the plant maintains by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFamily {
    HitTracker,
    ScrapLog,
    InventoryAdjustment,
}

impl SourceFamily {
    pub const ALL: [SourceFamily; 3] = [
        SourceFamily::HitTracker,
        SourceFamily::ScrapLog,
        SourceFamily::InventoryAdjustment,
    ];

    /// Whether rows of this family become `AdjustmentRecord`s.
    pub fn yields_adjustments(self) -> bool {
        !matches!(self, SourceFamily::HitTracker)
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFamily::HitTracker => write!(f, "hit-tracker"),
            SourceFamily::ScrapLog => write!(f, "scrap-log"),
            SourceFamily::InventoryAdjustment => write!(f, "inventory-adjustment"),
        }
    }
}

impl std::str::FromStr for SourceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "hit-tracker" | "hits" => Ok(SourceFamily::HitTracker),
            "scrap-log" | "scrap" => Ok(SourceFamily::ScrapLog),
            "inventory-adjustment" | "adjustments" | "inventory" => {
                Ok(SourceFamily::InventoryAdjustment)
            }
            other => Err(format!("Unknown source type: '{other}'")),
        }
    }
}

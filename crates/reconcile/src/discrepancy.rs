//! Compares detail totals against an independently kept master summary.
//! Differences are surfaced, never resolved.

use pressline_core::{Money, YearMonth};
use pressline_import::parse_decimal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
}

/// Monthly totals from the master summary workbook (`period,total`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterTotals {
    pub totals: BTreeMap<YearMonth, Money>,
    /// Rows that could not be read, as `(line, message)`.
    pub rejected: Vec<(usize, String)>,
}

impl MasterTotals {
    pub fn from_path(path: &Path) -> Result<Self, MasterError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(data: R) -> Result<Self, MasterError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers = reader.headers()?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or(MasterError::MissingColumn(name))
        };
        let period_col = column("period")?;
        let total_col = column("total")?;

        let mut out = MasterTotals::default();
        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let record = result?;
            let period_text = record.get(period_col).unwrap_or_default();
            let total_text = record.get(total_col).unwrap_or_default();

            let Ok(period) = period_text.parse::<YearMonth>() else {
                out.rejected.push((line, format!("unreadable period '{period_text}'")));
                continue;
            };
            let Some(total) = parse_decimal(total_text).map(Money::from_decimal) else {
                out.rejected.push((line, format!("unreadable total '{total_text}'")));
                continue;
            };
            if out.totals.contains_key(&period) {
                out.rejected.push((line, format!("duplicate period {period}; first row kept")));
                continue;
            }
            out.totals.insert(period, total);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscrepancyThresholds {
    pub percent: Decimal,
    pub absolute: Decimal,
}

impl Default for DiscrepancyThresholds {
    fn default() -> Self {
        Self {
            percent: Decimal::TEN,
            absolute: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub period: YearMonth,
    pub master: Money,
    pub detail: Money,
    /// `detail - master`.
    pub difference: Money,
    /// `|difference| / |master| × 100`; absent when the master total is zero.
    pub percent: Option<Decimal>,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Comparison {
    pub discrepancies: Vec<Discrepancy>,
    pub missing_in_master: Vec<YearMonth>,
    pub missing_in_detail: Vec<YearMonth>,
}

/// Compare every period present on both sides; list periods present on one side only.
pub fn compare(
    detail: &BTreeMap<YearMonth, Money>,
    master: &MasterTotals,
    thresholds: &DiscrepancyThresholds,
) -> Comparison {
    let mut out = Comparison::default();

    for (period, &detail_total) in detail {
        let Some(&master_total) = master.totals.get(period) else {
            out.missing_in_master.push(*period);
            continue;
        };
        let difference = detail_total - master_total;
        // Thresholds see the exact ratio; only the reported value is rounded.
        let exact_pct = (!master_total.is_zero()).then(|| {
            difference.abs().as_decimal() / master_total.abs().as_decimal() * Decimal::ONE_HUNDRED
        });
        let flagged = difference.abs().as_decimal() > thresholds.absolute
            || exact_pct.is_some_and(|p| p > thresholds.percent);
        let pct = exact_pct.map(|p| p.round_dp(2));
        if flagged {
            tracing::warn!(
                "{period}: detail {detail_total} vs master {master_total} (difference {difference})"
            );
        }
        out.discrepancies.push(Discrepancy {
            period: *period,
            master: master_total,
            detail: detail_total,
            difference,
            percent: pct,
            flagged,
        });
    }

    out.missing_in_detail = master
        .totals
        .keys()
        .filter(|p| !detail.contains_key(p))
        .copied()
        .collect();
    out
}

//! Detects groups of adjustments that represent internal movement of stock
//! (a container re-count, a move to the next operation) rather than a real
//! gain or loss.

use chrono::NaiveDate;
use pressline_core::{AdjustmentRecord, Money};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::movement::MovementVocabulary;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairingPolicy {
    pub tolerance_percent: Decimal,
    pub tolerance_absolute: Decimal,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            tolerance_percent: Decimal::new(1, 1),
            tolerance_absolute: Decimal::ONE,
        }
    }
}

impl PairingPolicy {
    /// `max(gross × percent / 100, absolute)`.
    pub fn tolerance(&self, gross_quantity: Decimal) -> Decimal {
        let relative = gross_quantity.abs() * self.tolerance_percent / Decimal::ONE_HUNDRED;
        relative.max(self.tolerance_absolute)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedTransferGroup {
    pub date: NaiveDate,
    pub part_number: String,
    pub operation: Option<String>,
    pub records: Vec<AdjustmentRecord>,
    pub net_quantity: Decimal,
    pub tolerance: Decimal,
    pub gross_cost: Money,
}

/// Offsetting movement that fell outside the tolerance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnbalancedGroup {
    pub date: NaiveDate,
    pub part_number: String,
    pub operation: Option<String>,
    pub net_quantity: Decimal,
    pub tolerance: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PairingOutcome<'a> {
    pub paired: Vec<PairedTransferGroup>,
    /// Records that count as real gains and losses, in input order.
    pub true_impact: Vec<&'a AdjustmentRecord>,
    pub unbalanced: Vec<UnbalancedGroup>,
}

type GroupKey<'a> = (NaiveDate, &'a str, Option<&'a str>);

/// Group by `(date, part_number, operation)` and split paired transfers from
/// true impact.
pub fn detect_pairs<'a>(
    records: &'a [AdjustmentRecord],
    policy: &PairingPolicy,
    vocabulary: &MovementVocabulary,
) -> PairingOutcome<'a> {
    let mut groups: BTreeMap<GroupKey<'a>, Vec<usize>> = BTreeMap::new();
    for (idx, rec) in records.iter().enumerate() {
        let key = (rec.date, rec.part_number.as_str(), rec.operation.as_deref());
        groups.entry(key).or_default().push(idx);
    }

    let mut outcome = PairingOutcome::default();
    let mut is_paired = vec![false; records.len()];

    for ((date, part_number, operation), members) in groups {
        if members.len() < 2 {
            continue;
        }
        let group: Vec<&AdjustmentRecord> = members.iter().map(|&i| &records[i]).collect();

        let increases: Decimal = group
            .iter()
            .filter(|r| r.is_increase())
            .map(|r| r.quantity_delta)
            .sum();
        let decreases: Decimal = group
            .iter()
            .filter(|r| !r.is_increase())
            .map(|r| r.quantity_delta)
            .sum();
        if increases.is_zero() || decreases.is_zero() {
            continue;
        }
        if !group.iter().all(|r| vocabulary.is_movement(r.reason.as_deref())) {
            continue;
        }

        let net_quantity = increases + decreases;
        let tolerance = policy.tolerance(increases.max(decreases.abs()));
        if net_quantity.is_zero() || net_quantity.abs() <= tolerance {
            tracing::debug!(
                "Paired transfer {} {} {:?}: {} records, net {}",
                date,
                part_number,
                operation,
                group.len(),
                net_quantity
            );
            for &i in &members {
                is_paired[i] = true;
            }
            outcome.paired.push(PairedTransferGroup {
                date,
                part_number: part_number.to_string(),
                operation: operation.map(str::to_string),
                gross_cost: group.iter().map(|r| r.extended_cost.abs()).sum(),
                records: group.into_iter().cloned().collect(),
                net_quantity,
                tolerance,
            });
        } else {
            outcome.unbalanced.push(UnbalancedGroup {
                date,
                part_number: part_number.to_string(),
                operation: operation.map(str::to_string),
                net_quantity,
                tolerance,
            });
        }
    }

    outcome.true_impact = records
        .iter()
        .zip(&is_paired)
        .filter(|(_, paired)| !**paired)
        .map(|(rec, _)| rec)
        .collect();
    outcome
}

use pressline_core::{AdjustmentRecord, Money};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::aggregate::{by_month, by_part, by_reason, by_workcenter, monthly_cost, AggregateRow};
use crate::classify::{planned_split, PlannedSplit};
use crate::config::{ConfigError, ReconciliationConfig};
use crate::discrepancy::{compare, Discrepancy, DiscrepancyThresholds, MasterTotals};
use crate::pairing::{detect_pairs, PairedTransferGroup, PairingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FindingKind {
    MissingInMaster,
    MissingInDetail,
    MasterRowRejected,
    UnbalancedTransfer,
    DerivedUnitCost,
    ZeroCost,
}

/// A data-quality observation. Reported, never acted on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    fn new(kind: FindingKind, message: String) -> Self {
        Self { kind, message }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactTotals {
    pub records: usize,
    pub quantity_net: Decimal,
    pub quantity_abs: Decimal,
    pub cost_net: Money,
    pub cost_abs: Money,
}

impl ImpactTotals {
    fn of<'a>(records: impl IntoIterator<Item = &'a AdjustmentRecord>) -> Self {
        let mut totals = ImpactTotals::default();
        for rec in records {
            totals.records += 1;
            totals.quantity_net += rec.quantity_delta;
            totals.quantity_abs += rec.quantity_delta.abs();
            totals.cost_net += rec.signed_cost();
            totals.cost_abs += rec.extended_cost.abs();
        }
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedVsTrue {
    pub true_impact: ImpactTotals,
    pub paired: ImpactTotals,
    pub gross: ImpactTotals,
    pub groups: Vec<PairedTransferGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Planned/unplanned split of the true-impact records.
    pub totals: PlannedSplit,
    /// The same split over every record, paired transfers included.
    pub gross_totals: PlannedSplit,
    pub by_month: Vec<AggregateRow>,
    pub by_part: Vec<AggregateRow>,
    pub by_reason: Vec<AggregateRow>,
    pub by_workcenter: Vec<AggregateRow>,
    pub paired_vs_true: PairedVsTrue,
    pub discrepancies: Vec<Discrepancy>,
    pub top_parts: Vec<AggregateRow>,
    pub findings: Vec<Finding>,
}

impl ReconciliationReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn flagged_discrepancies(&self) -> impl Iterator<Item = &Discrepancy> {
        self.discrepancies.iter().filter(|d| d.flagged)
    }
}

/// Build the report for one record set. Only configuration problems are errors.
pub fn reconcile(
    records: &[AdjustmentRecord],
    config: &ReconciliationConfig,
    master: Option<&MasterTotals>,
) -> Result<ReconciliationReport, ConfigError> {
    config.validate()?;

    let policy = PairingPolicy {
        tolerance_percent: config.pair_tolerance_percent,
        tolerance_absolute: config.pair_tolerance_absolute,
    };
    let vocabulary = config.movement_vocabulary();
    let pairing = detect_pairs(records, &policy, &vocabulary);
    let true_impact = &pairing.true_impact;

    let mut findings = Vec::new();
    for group in &pairing.unbalanced {
        findings.push(Finding::new(
            FindingKind::UnbalancedTransfer,
            format!(
                "{} {} {}: offsetting movement nets {} (tolerance {})",
                group.date,
                group.part_number,
                group.operation.as_deref().unwrap_or("-"),
                group.net_quantity,
                group.tolerance
            ),
        ));
    }
    let derived = records.iter().filter(|r| r.unit_cost_derived).count();
    if derived > 0 {
        findings.push(Finding::new(
            FindingKind::DerivedUnitCost,
            format!("{derived} records had unit cost derived from extended cost"),
        ));
    }
    let zero_cost = records.iter().filter(|r| r.extended_cost.is_zero()).count();
    if zero_cost > 0 {
        findings.push(Finding::new(
            FindingKind::ZeroCost,
            format!("{zero_cost} records carry no cost"),
        ));
    }

    let mut discrepancies = Vec::new();
    if let Some(master) = master {
        for (line, message) in &master.rejected {
            findings.push(Finding::new(
                FindingKind::MasterRowRejected,
                format!("master line {line}: {message}"),
            ));
        }
        let thresholds = DiscrepancyThresholds {
            percent: config.discrepancy_percent_threshold,
            absolute: config.discrepancy_absolute_threshold,
        };
        let cmp = compare(&monthly_cost(true_impact.iter().copied()), master, &thresholds);
        for period in cmp.missing_in_master {
            findings.push(Finding::new(
                FindingKind::MissingInMaster,
                format!("{period} has detail records but no master total"),
            ));
        }
        for period in cmp.missing_in_detail {
            findings.push(Finding::new(
                FindingKind::MissingInDetail,
                format!("{period} has a master total but no detail records"),
            ));
        }
        discrepancies = cmp.discrepancies;
    }

    let by_part = by_part(true_impact.iter().copied());
    let top_parts = by_part.iter().take(config.top_n).cloned().collect();
    let paired_records = pairing.paired.iter().flat_map(|g| g.records.iter());

    let report = ReconciliationReport {
        totals: planned_split(true_impact.iter().copied(), &config.planned_codes),
        gross_totals: planned_split(records, &config.planned_codes),
        by_month: by_month(true_impact.iter().copied()),
        by_reason: by_reason(true_impact.iter().copied()),
        by_workcenter: by_workcenter(true_impact.iter().copied()),
        by_part,
        paired_vs_true: PairedVsTrue {
            true_impact: ImpactTotals::of(true_impact.iter().copied()),
            paired: ImpactTotals::of(paired_records),
            gross: ImpactTotals::of(records),
            groups: pairing.paired.clone(),
        },
        discrepancies,
        top_parts,
        findings,
    };

    tracing::info!(
        "Reconciled {} records: {} true impact, {} in {} paired groups, {} findings",
        records.len(),
        report.paired_vs_true.true_impact.records,
        report.paired_vs_true.paired.records,
        report.paired_vs_true.groups.len(),
        report.findings.len()
    );
    Ok(report)
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (title, split) in [
            ("Totals (true impact)", &self.totals),
            ("Totals (all records)", &self.gross_totals),
        ] {
            writeln!(f, "{title}")?;
            writeln!(
                f,
                "  {} records, qty {}, cost {}",
                split.total.records, split.total.quantity, split.total.cost
            )?;
            writeln!(
                f,
                "  planned    {:>6} records  {:>16}  ({}% of cost)",
                split.planned.records, split.planned.cost, split.planned.cost_percent
            )?;
            writeln!(
                f,
                "  unplanned  {:>6} records  {:>16}  ({}% of cost)",
                split.unplanned.records, split.unplanned.cost, split.unplanned.cost_percent
            )?;
        }

        let pvt = &self.paired_vs_true;
        writeln!(f, "\nPaired vs true impact")?;
        for (label, totals) in [("true", &pvt.true_impact), ("paired", &pvt.paired), ("gross", &pvt.gross)] {
            writeln!(
                f,
                "  {:<7} {:>6} records  qty net {:>10}  cost {:>16}",
                label, totals.records, totals.quantity_net, totals.cost_abs
            )?;
        }

        if !self.top_parts.is_empty() {
            writeln!(f, "\nTop parts")?;
            for row in &self.top_parts {
                writeln!(
                    f,
                    "  {:<24} {:>6} records  {:>16}",
                    row.key, row.records, row.abs_cost
                )?;
            }
        }

        if !self.discrepancies.is_empty() {
            writeln!(f, "\nMaster vs detail")?;
            for d in &self.discrepancies {
                let pct = d.percent.map(|p| format!("{p}%")).unwrap_or_else(|| "n/a".to_string());
                writeln!(
                    f,
                    "  {}  master {:>14}  detail {:>14}  diff {:>14}  {:>8}{}",
                    d.period,
                    d.master,
                    d.detail,
                    d.difference,
                    pct,
                    if d.flagged { "  FLAGGED" } else { "" }
                )?;
            }
        }

        if !self.findings.is_empty() {
            writeln!(f, "\nFindings")?;
            for finding in &self.findings {
                writeln!(f, "  - {}", finding.message)?;
            }
        }
        Ok(())
    }
}

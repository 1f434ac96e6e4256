use pressline_core::{AdjustmentRecord, Money, ScrapClass};
use rust_decimal::Decimal;
use serde::Serialize;

/// Magnitudes for one class of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTotals {
    pub records: usize,
    pub quantity: Decimal,
    pub cost: Money,
    pub quantity_percent: Decimal,
    pub cost_percent: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSplit {
    pub planned: ClassTotals,
    pub unplanned: ClassTotals,
    pub total: ClassTotals,
}

/// Split records by whether their reason code is budgeted. Quantities and
/// costs are summed as magnitudes so `planned + unplanned == total` exactly.
pub fn planned_split<'a>(
    records: impl IntoIterator<Item = &'a AdjustmentRecord>,
    planned_codes: &[u32],
) -> PlannedSplit {
    let mut split = PlannedSplit::default();
    for rec in records {
        let bucket = match ScrapClass::of(rec.reason_code, planned_codes) {
            ScrapClass::Planned => &mut split.planned,
            ScrapClass::Unplanned => &mut split.unplanned,
        };
        bucket.records += 1;
        bucket.quantity += rec.quantity_delta.abs();
        bucket.cost += rec.extended_cost.abs();
    }

    split.total = ClassTotals {
        records: split.planned.records + split.unplanned.records,
        quantity: split.planned.quantity + split.unplanned.quantity,
        cost: split.planned.cost + split.unplanned.cost,
        quantity_percent: Decimal::ZERO,
        cost_percent: Decimal::ZERO,
    };
    for bucket in [&mut split.planned, &mut split.unplanned] {
        bucket.quantity_percent = percent(bucket.quantity, split.total.quantity);
        bucket.cost_percent = percent(bucket.cost.as_decimal(), split.total.cost.as_decimal());
    }
    if split.total.records > 0 {
        split.total.quantity_percent = Decimal::ONE_HUNDRED;
        split.total.cost_percent = Decimal::ONE_HUNDRED;
    }
    split
}

/// `part / whole × 100` to two places; `0` when the whole is zero.
pub fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
}

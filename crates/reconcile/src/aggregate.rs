use pressline_core::{AdjustmentRecord, Money, YearMonth, UNCLASSIFIED_REASON};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

pub const NO_VALUE_KEY: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub key: String,
    pub records: usize,
    pub net_quantity: Decimal,
    pub abs_cost: Money,
    pub net_cost: Money,
}

impl AggregateRow {
    fn new(key: String) -> Self {
        Self {
            key,
            records: 0,
            net_quantity: Decimal::ZERO,
            abs_cost: Money::zero(),
            net_cost: Money::zero(),
        }
    }

    fn add(&mut self, rec: &AdjustmentRecord) {
        self.records += 1;
        self.net_quantity += rec.quantity_delta;
        self.abs_cost += rec.extended_cost.abs();
        self.net_cost += rec.signed_cost();
    }
}

/// Sum records per key. Rows come back ordered by key.
pub fn aggregate_by<'a, F>(records: impl IntoIterator<Item = &'a AdjustmentRecord>, key: F) -> Vec<AggregateRow>
where
    F: Fn(&AdjustmentRecord) -> String,
{
    let mut rows: BTreeMap<String, AggregateRow> = BTreeMap::new();
    for rec in records {
        let k = key(rec);
        rows.entry(k.clone())
            .or_insert_with(|| AggregateRow::new(k))
            .add(rec);
    }
    rows.into_values().collect()
}

/// Absolute cost descending, then record count descending, then key ascending.
pub fn rank(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| {
        b.abs_cost
            .cmp(&a.abs_cost)
            .then_with(|| b.records.cmp(&a.records))
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Chronological.
pub fn by_month<'a>(records: impl IntoIterator<Item = &'a AdjustmentRecord>) -> Vec<AggregateRow> {
    aggregate_by(records, |r| YearMonth::of(r.date).to_string())
}

pub fn by_part<'a>(records: impl IntoIterator<Item = &'a AdjustmentRecord>) -> Vec<AggregateRow> {
    let mut rows = aggregate_by(records, |r| r.part_number.clone());
    rank(&mut rows);
    rows
}

/// Numbered reasons group by code; free-text reasons by their text.
pub fn by_reason<'a>(records: impl IntoIterator<Item = &'a AdjustmentRecord>) -> Vec<AggregateRow> {
    let mut rows = aggregate_by(records, reason_key);
    rank(&mut rows);
    rows
}

pub fn by_workcenter<'a>(records: impl IntoIterator<Item = &'a AdjustmentRecord>) -> Vec<AggregateRow> {
    let mut rows = aggregate_by(records, |r| {
        r.location.clone().unwrap_or_else(|| NO_VALUE_KEY.to_string())
    });
    rank(&mut rows);
    rows
}

fn reason_key(rec: &AdjustmentRecord) -> String {
    if rec.reason_code != UNCLASSIFIED_REASON {
        return rec.reason_code.to_string();
    }
    rec.reason
        .as_deref()
        .map(|r| r.to_uppercase())
        .unwrap_or_else(|| NO_VALUE_KEY.to_string())
}

/// Per-month absolute cost, the figure compared against master totals.
pub fn monthly_cost<'a>(records: impl IntoIterator<Item = &'a AdjustmentRecord>) -> BTreeMap<YearMonth, Money> {
    let mut totals: BTreeMap<YearMonth, Money> = BTreeMap::new();
    for rec in records {
        *totals.entry(YearMonth::of(rec.date)).or_default() += rec.extended_cost.abs();
    }
    totals
}

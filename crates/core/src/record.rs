use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::money::Money;
use super::reason::{reason_code, UNCLASSIFIED_REASON};

/// Unit costs keep more precision than cents: stamped parts often cost
/// fractions of a cent each.
pub const UNIT_COST_DP: u32 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("Quantity is zero")]
    ZeroQuantity,
    #[error("Part number is blank")]
    MissingPartNumber,
    #[error("Machine name is blank")]
    MissingMachine,
    #[error("Hit count is negative: {0}")]
    NegativeHits(i64),
}

/// A row as read from a sheet, before the record invariants are checked.
#[derive(Debug, Clone)]
pub struct AdjustmentDraft {
    pub date: NaiveDate,
    pub part_number: String,
    pub revision: Option<String>,
    pub operation: Option<String>,
    pub quantity_delta: Decimal,
    pub unit_cost: Option<Decimal>,
    pub extended_cost: Option<Money>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub source_file: String,
    pub sheet: String,
    pub source_row: usize,
}

/// One inventory or scrap movement. Never carries a zero quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredAdjustment")]
pub struct AdjustmentRecord {
    pub date: NaiveDate,
    pub part_number: String,
    pub revision: Option<String>,
    pub operation: Option<String>,
    pub quantity_delta: Decimal,
    pub unit_cost: Decimal,
    pub unit_cost_derived: bool,
    pub extended_cost: Money,
    pub reason: Option<String>,
    pub reason_code: u32,
    pub location: Option<String>,
    pub source_file: String,
    pub sheet: String,
    pub source_row: usize,
}

impl AdjustmentRecord {
    pub fn validate(draft: AdjustmentDraft) -> Result<AdjustmentRecord, RecordError> {
        let part_number = draft.part_number.trim().to_string();
        if part_number.is_empty() {
            return Err(RecordError::MissingPartNumber);
        }
        if draft.quantity_delta.is_zero() {
            return Err(RecordError::ZeroQuantity);
        }

        let quantity = draft.quantity_delta;
        let (unit_cost, unit_cost_derived, extended_cost) =
            match (draft.unit_cost, draft.extended_cost) {
                (Some(unit), Some(ext)) => (unit, false, ext),
                (None, Some(ext)) => (
                    (ext.as_decimal() / quantity).abs().round_dp(UNIT_COST_DP),
                    true,
                    ext,
                ),
                (Some(unit), None) => (unit, false, Money::from_decimal(unit * quantity.abs())),
                (None, None) => (Decimal::ZERO, false, Money::zero()),
            };

        let reason = draft
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let reason_code = reason.as_deref().map_or(UNCLASSIFIED_REASON, reason_code);

        Ok(AdjustmentRecord {
            date: draft.date,
            part_number,
            revision: clean(draft.revision),
            operation: clean(draft.operation),
            quantity_delta: quantity,
            unit_cost,
            unit_cost_derived,
            extended_cost,
            reason,
            reason_code,
            location: clean(draft.location),
            source_file: draft.source_file,
            sheet: draft.sheet,
            source_row: draft.source_row,
        })
    }

    /// Re-check the invariants of a record read back from storage.
    pub fn check(&self) -> Result<(), RecordError> {
        if self.part_number.trim().is_empty() {
            return Err(RecordError::MissingPartNumber);
        }
        if self.quantity_delta.is_zero() {
            return Err(RecordError::ZeroQuantity);
        }
        Ok(())
    }

    pub fn is_increase(&self) -> bool {
        self.quantity_delta.is_sign_positive()
    }

    /// Cost carrying the direction of the quantity. Sheets record extended
    /// cost unsigned next to a signed quantity.
    pub fn signed_cost(&self) -> Money {
        if self.is_increase() {
            self.extended_cost.abs()
        } else {
            -self.extended_cost.abs()
        }
    }
}

/// Serialized shape of `AdjustmentRecord`; deserializing goes through `check`.
#[derive(Deserialize)]
struct StoredAdjustment {
    date: NaiveDate,
    part_number: String,
    revision: Option<String>,
    operation: Option<String>,
    quantity_delta: Decimal,
    unit_cost: Decimal,
    unit_cost_derived: bool,
    extended_cost: Money,
    reason: Option<String>,
    reason_code: u32,
    location: Option<String>,
    source_file: String,
    sheet: String,
    source_row: usize,
}

impl TryFrom<StoredAdjustment> for AdjustmentRecord {
    type Error = RecordError;

    fn try_from(s: StoredAdjustment) -> Result<Self, Self::Error> {
        let record = AdjustmentRecord {
            date: s.date,
            part_number: s.part_number,
            revision: s.revision,
            operation: s.operation,
            quantity_delta: s.quantity_delta,
            unit_cost: s.unit_cost,
            unit_cost_derived: s.unit_cost_derived,
            extended_cost: s.extended_cost,
            reason: s.reason,
            reason_code: s.reason_code,
            location: s.location,
            source_file: s.source_file,
            sheet: s.sheet,
            source_row: s.source_row,
        };
        record.check()?;
        Ok(record)
    }
}

/// Press-cycle count for one machine on one day (and shift, when known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredHit")]
pub struct HitRecord {
    pub date: NaiveDate,
    pub shift: Option<u8>,
    pub machine: String,
    pub part_number: Option<String>,
    pub hits: i64,
    pub source_file: String,
    pub sheet: String,
    pub source_row: usize,
}

impl HitRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        date: NaiveDate,
        shift: Option<u8>,
        machine: String,
        part_number: Option<String>,
        hits: i64,
        source_file: String,
        sheet: String,
        source_row: usize,
    ) -> Result<HitRecord, RecordError> {
        if machine.trim().is_empty() {
            return Err(RecordError::MissingMachine);
        }
        if hits < 0 {
            return Err(RecordError::NegativeHits(hits));
        }
        Ok(HitRecord {
            date,
            shift,
            machine,
            part_number: clean(part_number),
            hits,
            source_file,
            sheet,
            source_row,
        })
    }
}

#[derive(Deserialize)]
struct StoredHit {
    date: NaiveDate,
    shift: Option<u8>,
    machine: String,
    part_number: Option<String>,
    hits: i64,
    source_file: String,
    sheet: String,
    source_row: usize,
}

impl TryFrom<StoredHit> for HitRecord {
    type Error = RecordError;

    fn try_from(s: StoredHit) -> Result<Self, Self::Error> {
        HitRecord::new(
            s.date,
            s.shift,
            s.machine,
            s.part_number,
            s.hits,
            s.source_file,
            s.sheet,
            s.source_row,
        )
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

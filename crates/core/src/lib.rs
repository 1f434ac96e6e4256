pub mod money;
pub mod period;
pub mod reason;
pub mod record;

pub use money::Money;
pub use period::{excel_serial_to_date, YearMonth};
pub use reason::{reason_code, ScrapClass, SourceFamily, UNCLASSIFIED_REASON};
pub use record::{AdjustmentDraft, AdjustmentRecord, HitRecord, RecordError};

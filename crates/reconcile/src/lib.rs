pub mod aggregate;
pub mod classify;
pub mod config;
pub mod discrepancy;
pub mod movement;
pub mod pairing;
pub mod report;

pub use aggregate::{rank, AggregateRow};
pub use classify::{planned_split, ClassTotals, PlannedSplit};
pub use config::{ConfigError, ReconciliationConfig};
pub use discrepancy::{compare, Discrepancy, DiscrepancyThresholds, MasterError, MasterTotals};
pub use movement::{MatchType, MovementRule, MovementVocabulary};
pub use pairing::{detect_pairs, PairedTransferGroup, PairingOutcome, PairingPolicy};
pub use report::{reconcile, Finding, FindingKind, ImpactTotals, PairedVsTrue, ReconciliationReport};

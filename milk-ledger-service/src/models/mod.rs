//! Domain models for milk-ledger-service.

mod category;
mod ledger;
mod movement;

pub use category::MovementCategory;
pub use ledger::{LedgerDelta, LedgerDiscrepancy, LedgerSummary, MilkLedgerEntry};
pub use movement::{
    movement_deltas, normalize_volume, within_volume_limit, CreateMovement, MilkMovement,
    UpdateMovement, VOLUME_LIMIT, VOLUME_SCALE,
};

mod ledger;
mod movements;

pub use ledger::{
    AdjustmentRequest, BalanceParams, BalanceResponse, DateRangeParams, LedgerResponse,
};
pub use movements::{MovementChangeResponse, MovementListParams, MovementListResponse};

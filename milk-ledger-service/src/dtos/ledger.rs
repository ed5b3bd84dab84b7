use crate::models::{MilkLedgerEntry, MovementCategory};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub date: NaiveDate,
    pub category: MovementCategory,
    /// Signed liters: positive on create, negative on delete, net on edit.
    pub delta: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct BalanceParams {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub as_of: NaiveDate,
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerResponse {
    pub entries: Vec<MilkLedgerEntry>,
}

use crate::models::{MilkLedgerEntry, MilkMovement, MovementCategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct MovementListParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub category: Option<MovementCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MovementListResponse {
    pub movements: Vec<MilkMovement>,
    pub total: usize,
}

/// A movement write together with the ledger entries it rewrote.
#[derive(Debug, Serialize, Deserialize)]
pub struct MovementChangeResponse {
    pub movement: MilkMovement,
    pub ledger: Vec<MilkLedgerEntry>,
}

impl From<(MilkMovement, Vec<MilkLedgerEntry>)> for MovementChangeResponse {
    fn from((movement, ledger): (MilkMovement, Vec<MilkLedgerEntry>)) -> Self {
        Self { movement, ledger }
    }
}

impl From<Vec<MilkMovement>> for MovementListResponse {
    fn from(movements: Vec<MilkMovement>) -> Self {
        Self {
            total: movements.len(),
            movements,
        }
    }
}

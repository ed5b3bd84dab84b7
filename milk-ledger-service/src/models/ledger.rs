//! Daily milk ledger entry model.

use super::MovementCategory;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One aggregate row per calendar day.
///
/// `closing_balance` is derived from the other fields and is only ever
/// written through [`MilkLedgerEntry::recompute_closing`].
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MilkLedgerEntry {
    pub entry_date: NaiveDate,
    pub opening_balance: Decimal,
    pub total_produced: Decimal,
    pub total_collected: Decimal,
    pub total_sold: Decimal,
    pub total_production_used: Decimal,
    pub total_calf_consumed: Decimal,
    pub total_waste: Decimal,
    pub closing_balance: Decimal,
    pub updated_utc: DateTime<Utc>,
}

impl MilkLedgerEntry {
    /// Fresh entry with every total at zero.
    pub fn new(entry_date: NaiveDate, opening_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            entry_date,
            opening_balance,
            total_produced: Decimal::ZERO,
            total_collected: Decimal::ZERO,
            total_sold: Decimal::ZERO,
            total_production_used: Decimal::ZERO,
            total_calf_consumed: Decimal::ZERO,
            total_waste: Decimal::ZERO,
            closing_balance: opening_balance,
            updated_utc: now,
        }
    }

    /// Current total for a category.
    pub fn total(&self, category: MovementCategory) -> Decimal {
        match category {
            MovementCategory::Produced => self.total_produced,
            MovementCategory::Collected => self.total_collected,
            MovementCategory::Sold => self.total_sold,
            MovementCategory::ProductionUsed => self.total_production_used,
            MovementCategory::CalfConsumed => self.total_calf_consumed,
            MovementCategory::Waste => self.total_waste,
        }
    }

    pub(crate) fn set_total(&mut self, category: MovementCategory, value: Decimal) {
        let slot = match category {
            MovementCategory::Produced => &mut self.total_produced,
            MovementCategory::Collected => &mut self.total_collected,
            MovementCategory::Sold => &mut self.total_sold,
            MovementCategory::ProductionUsed => &mut self.total_production_used,
            MovementCategory::CalfConsumed => &mut self.total_calf_consumed,
            MovementCategory::Waste => &mut self.total_waste,
        };
        *slot = value;
    }

    /// Closing balance implied by opening balance and category totals.
    ///
    /// `None` when the sum overflows `Decimal`.
    pub fn expected_closing(&self) -> Option<Decimal> {
        MovementCategory::ALL
            .into_iter()
            .try_fold(self.opening_balance, |acc, category| {
                if category.is_inflow() {
                    acc.checked_add(self.total(category))
                } else {
                    acc.checked_sub(self.total(category))
                }
            })
    }

    /// Store the implied closing balance and return it; `None` on overflow
    /// leaves the entry unchanged.
    pub(crate) fn recompute_closing(&mut self) -> Option<Decimal> {
        let closing = self.expected_closing()?;
        self.closing_balance = closing;
        Some(closing)
    }
}

/// Signed change to one category total on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub entry_date: NaiveDate,
    pub category: MovementCategory,
    pub delta: Decimal,
}

impl LedgerDelta {
    pub fn new(entry_date: NaiveDate, category: MovementCategory, delta: Decimal) -> Self {
        Self {
            entry_date,
            category,
            delta,
        }
    }
}

/// Figures shown above the dated balance sheet for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub opening_balance: Decimal,
    pub total_produced: Decimal,
    pub total_collected: Decimal,
    pub total_sold: Decimal,
    pub total_production_used: Decimal,
    pub total_calf_consumed: Decimal,
    pub total_waste: Decimal,
    pub closing_balance: Decimal,
    pub tracked_days: usize,
}

/// A stored entry that breaks one of the ledger invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerDiscrepancy {
    ClosingMismatch {
        entry_date: NaiveDate,
        stored: Decimal,
        expected: Decimal,
    },
    /// Totals too large for the closing balance to be computed at all.
    ClosingOverflow {
        entry_date: NaiveDate,
        stored: Decimal,
    },
    OpeningMismatch {
        entry_date: NaiveDate,
        previous_date: NaiveDate,
        stored: Decimal,
        expected: Decimal,
    },
    NegativeTotal {
        entry_date: NaiveDate,
        category: MovementCategory,
        total: Decimal,
    },
}

//! Balance arithmetic shared by every ledger store.
//!
//! Stores load the entry chain starting at the edited day, hand it to
//! [`apply_delta`], and persist whatever comes back in one atomic write.

use crate::error::LedgerError;
use crate::models::{
    within_volume_limit, LedgerDelta, LedgerDiscrepancy, LedgerSummary, MilkLedgerEntry,
    MovementCategory,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Apply one delta to the chain of entries dated on or after `delta.entry_date`.
///
/// `prior_closing` is the closing balance of the latest entry before that day,
/// if any. `tail` must be sorted ascending. The returned chain starts at the
/// edited day (inserted when missing) and contains every later entry with
/// recomputed balances; no entries past the last existing one are created.
pub fn apply_delta(
    prior_closing: Option<Decimal>,
    mut tail: Vec<MilkLedgerEntry>,
    delta: LedgerDelta,
    now: DateTime<Utc>,
) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
    debug_assert!(tail.windows(2).all(|w| w[0].entry_date < w[1].entry_date));
    debug_assert!(tail.iter().all(|e| e.entry_date >= delta.entry_date));

    if tail.first().map(|e| e.entry_date) != Some(delta.entry_date) {
        tail.insert(
            0,
            MilkLedgerEntry::new(
                delta.entry_date,
                prior_closing.unwrap_or(Decimal::ZERO),
                now,
            ),
        );
    }

    let out_of_range = || LedgerError::VolumeOutOfRange {
        date: delta.entry_date,
        category: delta.category,
    };

    let head = &mut tail[0];
    let resulting = head
        .total(delta.category)
        .checked_add(delta.delta)
        .filter(|total| within_volume_limit(*total))
        .ok_or_else(out_of_range)?;
    if resulting < Decimal::ZERO {
        return Err(LedgerError::InvalidVolume {
            date: delta.entry_date,
            category: delta.category,
            resulting,
        });
    }
    head.set_total(delta.category, resulting);
    head.updated_utc = now;

    let mut previous_closing: Option<Decimal> = None;
    for entry in tail.iter_mut() {
        if let Some(opening) = previous_closing {
            entry.opening_balance = opening;
            entry.updated_utc = now;
        }
        let closing = entry
            .recompute_closing()
            .filter(|closing| within_volume_limit(*closing))
            .ok_or_else(out_of_range)?;
        previous_closing = Some(closing);
    }

    Ok(tail)
}

/// Closing balance as of `date` given entries sorted ascending.
pub fn balance_as_of(entries: &[MilkLedgerEntry], date: NaiveDate) -> Decimal {
    entries
        .iter()
        .take_while(|e| e.entry_date <= date)
        .last()
        .map(|e| e.closing_balance)
        .unwrap_or(Decimal::ZERO)
}

/// Fold the stored entries of a period into its summary figures.
///
/// `opening_balance` is the balance as of the day before `start`.
pub fn summarize(
    start: NaiveDate,
    end: NaiveDate,
    opening_balance: Decimal,
    entries: &[MilkLedgerEntry],
) -> LedgerSummary {
    let sum = |category: MovementCategory| -> Decimal {
        entries.iter().map(|e| e.total(category)).sum()
    };

    LedgerSummary {
        start_date: start,
        end_date: end,
        opening_balance,
        total_produced: sum(MovementCategory::Produced),
        total_collected: sum(MovementCategory::Collected),
        total_sold: sum(MovementCategory::Sold),
        total_production_used: sum(MovementCategory::ProductionUsed),
        total_calf_consumed: sum(MovementCategory::CalfConsumed),
        total_waste: sum(MovementCategory::Waste),
        closing_balance: entries
            .last()
            .map(|e| e.closing_balance)
            .unwrap_or(opening_balance),
        tracked_days: entries.len(),
    }
}

/// Every invariant violation among `entries` (sorted ascending).
///
/// `previous` is the latest stored entry before the first one checked, so the
/// chaining rule is also verified across the start of the range.
pub fn find_discrepancies(
    previous: Option<&MilkLedgerEntry>,
    entries: &[MilkLedgerEntry],
) -> Vec<LedgerDiscrepancy> {
    let mut found = Vec::new();
    let mut previous = previous;

    for entry in entries {
        for category in MovementCategory::ALL {
            let total = entry.total(category);
            if total < Decimal::ZERO {
                found.push(LedgerDiscrepancy::NegativeTotal {
                    entry_date: entry.entry_date,
                    category,
                    total,
                });
            }
        }

        match entry.expected_closing() {
            Some(expected) if expected != entry.closing_balance => {
                found.push(LedgerDiscrepancy::ClosingMismatch {
                    entry_date: entry.entry_date,
                    stored: entry.closing_balance,
                    expected,
                });
            }
            Some(_) => {}
            None => found.push(LedgerDiscrepancy::ClosingOverflow {
                entry_date: entry.entry_date,
                stored: entry.closing_balance,
            }),
        }

        if let Some(prev) = previous {
            if entry.opening_balance != prev.closing_balance {
                found.push(LedgerDiscrepancy::OpeningMismatch {
                    entry_date: entry.entry_date,
                    previous_date: prev.entry_date,
                    stored: entry.opening_balance,
                    expected: prev.closing_balance,
                });
            }
        }

        previous = Some(entry);
    }

    found
}

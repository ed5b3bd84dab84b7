//! Movement records: the individual milkings, collections, sales, batch
//! inputs, calf feedings and waste logs that feed the daily ledger.

use super::{LedgerDelta, MovementCategory};
use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;
use validator::Validate;

/// Volumes are kept to millilitre precision, matching `NUMERIC(14,3)`.
pub const VOLUME_SCALE: u32 = 3;

/// Exclusive bound on any stored volume or balance: `NUMERIC(14,3)` keeps
/// eleven integer digits.
pub const VOLUME_LIMIT: i64 = 100_000_000_000;

/// Round a volume to the stored precision.
pub fn normalize_volume(volume: Decimal) -> Decimal {
    volume.round_dp(VOLUME_SCALE)
}

/// Whether `value` fits the ledger columns.
pub fn within_volume_limit(value: Decimal) -> bool {
    value.abs() < Decimal::from(VOLUME_LIMIT)
}

/// A single persisted movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilkMovement {
    pub movement_id: Uuid,
    pub movement_date: NaiveDate,
    pub category: MovementCategory,
    pub volume: Decimal,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MilkMovement {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let category: String = row.try_get("category")?;
        let category = category
            .parse::<MovementCategory>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "category".to_string(),
                source: e.into(),
            })?;

        Ok(Self {
            movement_id: row.try_get("movement_id")?,
            movement_date: row.try_get("movement_date")?,
            category,
            volume: row.try_get("volume")?,
            reference: row.try_get("reference")?,
            note: row.try_get("note")?,
            created_utc: row.try_get("created_utc")?,
            updated_utc: row.try_get("updated_utc")?,
        })
    }
}

impl MilkMovement {
    /// Build a new record from validated input.
    pub fn create(input: CreateMovement, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        let volume = checked_volume(input.volume)?;
        Ok(Self {
            movement_id: Uuid::new_v4(),
            movement_date: input.movement_date,
            category: input.category,
            volume,
            reference: non_empty(input.reference),
            note: non_empty(input.note),
            created_utc: now,
            updated_utc: now,
        })
    }

    /// The record after applying `patch`; unset fields keep their value.
    pub fn patched(&self, patch: &UpdateMovement, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        let volume = match patch.volume {
            Some(volume) => checked_volume(volume)?,
            None => self.volume,
        };
        Ok(Self {
            movement_id: self.movement_id,
            movement_date: patch.movement_date.unwrap_or(self.movement_date),
            category: patch.category.unwrap_or(self.category),
            volume,
            reference: match &patch.reference {
                Some(reference) => non_empty(Some(reference.clone())),
                None => self.reference.clone(),
            },
            note: match &patch.note {
                Some(note) => non_empty(Some(note.clone())),
                None => self.note.clone(),
            },
            created_utc: self.created_utc,
            updated_utc: now,
        })
    }

    /// Ledger contribution of this record while it exists.
    pub fn contribution(&self) -> LedgerDelta {
        LedgerDelta::new(self.movement_date, self.category, self.volume)
    }

    /// Ledger contribution being withdrawn when this record goes away.
    pub fn reversal(&self) -> LedgerDelta {
        LedgerDelta::new(self.movement_date, self.category, -self.volume)
    }
}

fn checked_volume(volume: Decimal) -> Result<Decimal, LedgerError> {
    let volume = normalize_volume(volume);
    if volume <= Decimal::ZERO {
        return Err(LedgerError::InvalidMovement(format!(
            "volume must be positive, got {}",
            volume
        )));
    }
    if !within_volume_limit(volume) {
        return Err(LedgerError::InvalidMovement(format!(
            "volume must be below {} liters, got {}",
            VOLUME_LIMIT, volume
        )));
    }
    Ok(volume)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Ledger deltas that move the ledger from `before` to `after`.
///
/// Creation has no `before`, deletion has no `after`. When date and category
/// are unchanged a single net delta is produced; a zero net produces nothing.
pub fn movement_deltas(before: Option<&MilkMovement>, after: Option<&MilkMovement>) -> Vec<LedgerDelta> {
    match (before, after) {
        (Some(old), Some(new))
            if old.movement_date == new.movement_date && old.category == new.category =>
        {
            let net = new.volume - old.volume;
            if net.is_zero() {
                Vec::new()
            } else {
                vec![LedgerDelta::new(new.movement_date, new.category, net)]
            }
        }
        (before, after) => before
            .map(MilkMovement::reversal)
            .into_iter()
            .chain(after.map(MilkMovement::contribution))
            .collect(),
    }
}

/// Input for recording a new movement.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateMovement {
    pub movement_date: NaiveDate,
    pub category: MovementCategory,
    pub volume: Decimal,
    /// Animal tag, supplier name, batch code or buyer.
    #[validate(length(max = 200, message = "Reference must be at most 200 characters"))]
    pub reference: Option<String>,
    #[validate(length(max = 2000, message = "Note must be at most 2000 characters"))]
    pub note: Option<String>,
}

/// Partial update of a movement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateMovement {
    pub movement_date: Option<NaiveDate>,
    pub category: Option<MovementCategory>,
    pub volume: Option<Decimal>,
    #[validate(length(max = 200, message = "Reference must be at most 200 characters"))]
    pub reference: Option<String>,
    #[validate(length(max = 2000, message = "Note must be at most 2000 characters"))]
    pub note: Option<String>,
}

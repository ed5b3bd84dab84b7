//! Domain errors raised by the milk ledger.

use crate::models::MovementCategory;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A category total would drop below zero. Nothing was persisted.
    #[error("{category} total for {date} would become {resulting}; totals cannot be negative")]
    InvalidVolume {
        date: NaiveDate,
        category: MovementCategory,
        resulting: Decimal,
    },

    /// A total or balance would leave the storable range. Nothing was persisted.
    #[error("{category} change on {date} exceeds the storable volume range")]
    VolumeOutOfRange {
        date: NaiveDate,
        category: MovementCategory,
    },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Movement {0} not found")]
    MovementNotFound(Uuid),

    #[error("Invalid movement: {0}")]
    InvalidMovement(String),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl LedgerError {
    /// Label for the errors metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidVolume { .. } => "invalid_volume",
            Self::VolumeOutOfRange { .. } => "volume_out_of_range",
            Self::InvalidRange { .. } => "invalid_range",
            Self::MovementNotFound(_) => "movement_not_found",
            Self::InvalidMovement(_) => "invalid_movement",
            Self::Storage(err) => err.kind(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            err @ (LedgerError::InvalidVolume { .. } | LedgerError::VolumeOutOfRange { .. }) => {
                AppError::UnprocessableEntity(anyhow::anyhow!(err.to_string()))
            }
            err @ (LedgerError::InvalidRange { .. } | LedgerError::MovementNotFound(_)) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            LedgerError::InvalidMovement(reason) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid movement: {}", reason))
            }
            LedgerError::Storage(err) => err,
        }
    }
}

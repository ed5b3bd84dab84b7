//! The milk balance reconciliation service.

use crate::error::LedgerError;
use crate::models::{
    normalize_volume, within_volume_limit, CreateMovement, LedgerDelta, LedgerDiscrepancy,
    LedgerSummary, MilkLedgerEntry, MilkMovement, MovementCategory, UpdateMovement,
};
use crate::services::metrics::{CASCADE_LENGTH, ERRORS_TOTAL, MOVEMENTS_RECORDED};
use crate::services::reconciliation::{find_discrepancies, summarize};
use crate::services::store::LedgerStore;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Single entry point for every change to the daily milk ledger.
///
/// Writers are serialized through one gate so that each cascade reads the
/// chain left by the previous one. Reads go straight to the store.
#[derive(Clone)]
pub struct MilkLedger {
    store: Arc<dyn LedgerStore>,
    writer: Arc<Mutex<()>>,
}

impl MilkLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.store.health_check().await
    }

    /// Add `delta` liters to `category` on `date` and cascade forward.
    ///
    /// Returns every rewritten entry, starting with `date`. A zero delta
    /// writes nothing and returns an empty chain.
    #[instrument(skip(self), fields(date = %date, category = %category, delta = %delta))]
    pub async fn record_movement(
        &self,
        date: NaiveDate,
        category: MovementCategory,
        delta: Decimal,
    ) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        let delta = normalize_volume(delta);
        if delta.is_zero() {
            debug!("Zero delta, ledger unchanged");
            return Ok(Vec::new());
        }

        let result = if within_volume_limit(delta) {
            let _guard = self.writer.lock().await;
            self.store
                .apply_deltas(&[LedgerDelta::new(date, category, delta)])
                .await
        } else {
            Err(LedgerError::VolumeOutOfRange { date, category })
        };
        self.observe(&[category], &result);

        let chain = result?;
        info!(cascaded = chain.len(), "Ledger movement recorded");
        Ok(chain)
    }

    /// Entries dated within `[start, end]`, ascending.
    #[instrument(skip(self))]
    pub async fn get_ledger(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        check_range(start, end)?;
        Ok(self.store.entries_between(start, end).await?)
    }

    /// Closing balance of `date`, or of the latest earlier entry, or zero.
    #[instrument(skip(self))]
    pub async fn get_balance_as_of(&self, date: NaiveDate) -> Result<Decimal, LedgerError> {
        Ok(self
            .store
            .latest_on_or_before(date)
            .await?
            .map(|e| e.closing_balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Opening, per-category sums and closing for a period.
    #[instrument(skip(self))]
    pub async fn get_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<LedgerSummary, LedgerError> {
        check_range(start, end)?;
        let opening = self
            .store
            .latest_before(start)
            .await?
            .map(|e| e.closing_balance)
            .unwrap_or(Decimal::ZERO);
        let entries = self.store.entries_between(start, end).await?;
        Ok(summarize(start, end, opening, &entries))
    }

    /// Invariant violations among stored entries in `[start, end]`.
    #[instrument(skip(self))]
    pub async fn audit(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerDiscrepancy>, LedgerError> {
        check_range(start, end)?;
        let previous = self.store.latest_before(start).await?;
        let entries = self.store.entries_between(start, end).await?;
        let found = find_discrepancies(previous.as_ref(), &entries);
        if !found.is_empty() {
            warn!(count = found.len(), "Ledger audit found discrepancies");
        }
        Ok(found)
    }

    /// Record a new movement and add it to the ledger.
    #[instrument(skip(self, input), fields(date = %input.movement_date, category = %input.category))]
    pub async fn create_movement(
        &self,
        input: CreateMovement,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        input.validate().map_err(AppError::from)?;
        let movement = MilkMovement::create(input, Utc::now())?;

        let _guard = self.writer.lock().await;
        let result = self.store.insert_movement(&movement).await;
        self.observe(&[movement.category], &result);

        let chain = result?;
        info!(
            movement_id = %movement.movement_id,
            volume = %movement.volume,
            cascaded = chain.len(),
            "Movement created"
        );
        Ok((movement, chain))
    }

    /// Patch a movement; its ledger contribution follows the new values.
    #[instrument(skip(self, patch), fields(movement_id = %movement_id))]
    pub async fn update_movement(
        &self,
        movement_id: Uuid,
        patch: UpdateMovement,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        patch.validate().map_err(AppError::from)?;

        let _guard = self.writer.lock().await;
        let result = self.store.update_movement(movement_id, &patch).await;
        let categories: Vec<_> = match &result {
            Ok((movement, _)) => vec![movement.category],
            Err(_) => patch.category.into_iter().collect(),
        };
        self.observe(&categories, &result);

        let (movement, chain) = result?;
        info!(cascaded = chain.len(), "Movement updated");
        Ok((movement, chain))
    }

    /// Delete a movement and withdraw its volume from the ledger.
    #[instrument(skip(self), fields(movement_id = %movement_id))]
    pub async fn delete_movement(
        &self,
        movement_id: Uuid,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        let _guard = self.writer.lock().await;
        let result = self.store.delete_movement(movement_id).await;
        let categories: Vec<_> = match &result {
            Ok((movement, _)) => vec![movement.category],
            Err(_) => Vec::new(),
        };
        self.observe(&categories, &result);

        let (movement, chain) = result?;
        info!(cascaded = chain.len(), "Movement deleted");
        Ok((movement, chain))
    }

    #[instrument(skip(self))]
    pub async fn get_movement(&self, movement_id: Uuid) -> Result<MilkMovement, LedgerError> {
        self.store
            .get_movement(movement_id)
            .await?
            .ok_or(LedgerError::MovementNotFound(movement_id))
    }

    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<MovementCategory>,
    ) -> Result<Vec<MilkMovement>, LedgerError> {
        check_range(start, end)?;
        Ok(self.store.list_movements(start, end, category).await?)
    }

    fn observe<T>(&self, categories: &[MovementCategory], result: &Result<T, LedgerError>)
    where
        T: CascadeLen,
    {
        let status = match result {
            Ok(value) => {
                CASCADE_LENGTH.observe(value.cascade_len() as f64);
                "ok"
            }
            Err(LedgerError::InvalidVolume {
                date,
                category,
                resulting,
            }) => {
                warn!(date = %date, category = %category, resulting = %resulting, "Movement rejected");
                "rejected"
            }
            Err(LedgerError::VolumeOutOfRange { date, category }) => {
                warn!(date = %date, category = %category, "Movement outside storable range");
                "rejected"
            }
            Err(_) => "error",
        };
        if let Err(err) = result {
            ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
        }
        for category in categories {
            MOVEMENTS_RECORDED
                .with_label_values(&[category.as_str(), status])
                .inc();
        }
    }
}

/// Results that carry a rewritten ledger chain.
trait CascadeLen {
    fn cascade_len(&self) -> usize;
}

impl CascadeLen for Vec<MilkLedgerEntry> {
    fn cascade_len(&self) -> usize {
        self.len()
    }
}

impl CascadeLen for (MilkMovement, Vec<MilkLedgerEntry>) {
    fn cascade_len(&self) -> usize {
        self.1.len()
    }
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), LedgerError> {
    if start > end {
        return Err(LedgerError::InvalidRange { start, end });
    }
    Ok(())
}

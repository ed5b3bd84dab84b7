//! Storage seam for the ledger and its movement records.

use crate::error::LedgerError;
use crate::models::{
    movement_deltas, LedgerDelta, MilkLedgerEntry, MilkMovement, MovementCategory,
    UpdateMovement,
};
use crate::services::reconciliation::apply_delta;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence for ledger entries and movement records.
///
/// Every mutating method is all-or-nothing: either the movement row and the
/// whole recomputed chain are stored, or nothing is.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Apply deltas in order and persist every rewritten entry.
    ///
    /// Returns the final state of each rewritten entry, ascending by date.
    async fn apply_deltas(&self, deltas: &[LedgerDelta]) -> Result<Vec<MilkLedgerEntry>, LedgerError>;

    /// Entries with `start <= entry_date <= end`, ascending.
    async fn entries_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MilkLedgerEntry>, AppError>;

    /// Latest entry dated on or before `date`.
    async fn latest_on_or_before(&self, date: NaiveDate) -> Result<Option<MilkLedgerEntry>, AppError>;

    /// Latest entry dated strictly before `date`.
    async fn latest_before(&self, date: NaiveDate) -> Result<Option<MilkLedgerEntry>, AppError> {
        match date.pred_opt() {
            Some(previous) => self.latest_on_or_before(previous).await,
            None => Ok(None),
        }
    }

    /// Insert a movement and add its volume to the ledger.
    async fn insert_movement(
        &self,
        movement: &MilkMovement,
    ) -> Result<Vec<MilkLedgerEntry>, LedgerError>;

    /// Patch a movement and move its contribution accordingly.
    async fn update_movement(
        &self,
        movement_id: Uuid,
        patch: &UpdateMovement,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError>;

    /// Delete a movement and withdraw its volume from the ledger.
    async fn delete_movement(
        &self,
        movement_id: Uuid,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError>;

    async fn get_movement(&self, movement_id: Uuid) -> Result<Option<MilkMovement>, AppError>;

    /// Movements in range, ascending by date then creation time.
    async fn list_movements(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<MovementCategory>,
    ) -> Result<Vec<MilkMovement>, AppError>;
}

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<NaiveDate, MilkLedgerEntry>,
    movements: HashMap<Uuid, MilkMovement>,
}

/// Process-local store used by tests and database-less runs.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Ledger state mutex poisoned: {}", e)))
    }

    /// Overwrite a stored entry without any recomputation.
    ///
    /// Only for simulating damage done outside the service.
    pub fn overwrite_entry(&self, entry: MilkLedgerEntry) -> Result<(), AppError> {
        self.lock()?.entries.insert(entry.entry_date, entry);
        Ok(())
    }
}

/// Apply deltas to a working copy; the caller swaps it in on success.
fn apply_to_copy(
    entries: &BTreeMap<NaiveDate, MilkLedgerEntry>,
    deltas: &[LedgerDelta],
) -> Result<(BTreeMap<NaiveDate, MilkLedgerEntry>, Vec<MilkLedgerEntry>), LedgerError> {
    let now = Utc::now();
    let mut working = entries.clone();
    let mut touched = BTreeMap::new();

    for delta in deltas {
        let prior = working
            .range(..delta.entry_date)
            .next_back()
            .map(|(_, e)| e.closing_balance);
        let tail: Vec<_> = working.range(delta.entry_date..).map(|(_, e)| e.clone()).collect();

        for entry in apply_delta(prior, tail, *delta, now)? {
            touched.insert(entry.entry_date, entry.clone());
            working.insert(entry.entry_date, entry);
        }
    }

    Ok((working, touched.into_values().collect()))
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }

    async fn apply_deltas(&self, deltas: &[LedgerDelta]) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        let mut state = self.lock()?;
        let (working, touched) = apply_to_copy(&state.entries, deltas)?;
        state.entries = working;
        Ok(touched)
    }

    async fn entries_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MilkLedgerEntry>, AppError> {
        if start > end {
            return Ok(Vec::new());
        }
        let state = self.lock()?;
        Ok(state.entries.range(start..=end).map(|(_, e)| e.clone()).collect())
    }

    async fn latest_on_or_before(&self, date: NaiveDate) -> Result<Option<MilkLedgerEntry>, AppError> {
        let state = self.lock()?;
        Ok(state.entries.range(..=date).next_back().map(|(_, e)| e.clone()))
    }

    async fn insert_movement(
        &self,
        movement: &MilkMovement,
    ) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        let mut state = self.lock()?;
        if state.movements.contains_key(&movement.movement_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Movement {} already exists",
                movement.movement_id
            ))
            .into());
        }

        let (working, touched) =
            apply_to_copy(&state.entries, &movement_deltas(None, Some(movement)))?;
        state.entries = working;
        state.movements.insert(movement.movement_id, movement.clone());
        Ok(touched)
    }

    async fn update_movement(
        &self,
        movement_id: Uuid,
        patch: &UpdateMovement,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        let mut state = self.lock()?;
        let before = state
            .movements
            .get(&movement_id)
            .cloned()
            .ok_or(LedgerError::MovementNotFound(movement_id))?;
        let after = before.patched(patch, Utc::now())?;

        let (working, touched) =
            apply_to_copy(&state.entries, &movement_deltas(Some(&before), Some(&after)))?;
        state.entries = working;
        state.movements.insert(movement_id, after.clone());
        Ok((after, touched))
    }

    async fn delete_movement(
        &self,
        movement_id: Uuid,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        let mut state = self.lock()?;
        let before = state
            .movements
            .get(&movement_id)
            .cloned()
            .ok_or(LedgerError::MovementNotFound(movement_id))?;

        let (working, touched) = apply_to_copy(&state.entries, &movement_deltas(Some(&before), None))?;
        state.entries = working;
        state.movements.remove(&movement_id);
        Ok((before, touched))
    }

    async fn get_movement(&self, movement_id: Uuid) -> Result<Option<MilkMovement>, AppError> {
        Ok(self.lock()?.movements.get(&movement_id).cloned())
    }

    async fn list_movements(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<MovementCategory>,
    ) -> Result<Vec<MilkMovement>, AppError> {
        let state = self.lock()?;
        let mut movements: Vec<_> = state
            .movements
            .values()
            .filter(|m| m.movement_date >= start && m.movement_date <= end)
            .filter(|m| category.map_or(true, |c| m.category == c))
            .cloned()
            .collect();
        movements.sort_by(|a, b| {
            (a.movement_date, a.created_utc, a.movement_id).cmp(&(
                b.movement_date,
                b.created_utc,
                b.movement_id,
            ))
        });
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateMovement;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn failed_batch_leaves_entries_untouched() {
        let store = MemoryLedgerStore::new();
        store
            .apply_deltas(&[LedgerDelta::new(day(1), MovementCategory::Produced, dec!(10))])
            .await
            .unwrap();

        let result = store
            .apply_deltas(&[
                LedgerDelta::new(day(1), MovementCategory::Produced, dec!(5)),
                LedgerDelta::new(day(2), MovementCategory::Sold, dec!(-1)),
            ])
            .await;

        assert!(matches!(result, Err(LedgerError::InvalidVolume { .. })));
        let entries = store.entries_between(day(1), day(31)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_produced, dec!(10));
    }

    #[tokio::test]
    async fn latest_before_skips_the_day_itself() {
        let store = MemoryLedgerStore::new();
        store
            .apply_deltas(&[
                LedgerDelta::new(day(1), MovementCategory::Produced, dec!(10)),
                LedgerDelta::new(day(3), MovementCategory::Produced, dec!(10)),
            ])
            .await
            .unwrap();

        let before = store.latest_before(day(3)).await.unwrap().unwrap();
        assert_eq!(before.entry_date, day(1));
        let at = store.latest_on_or_before(day(3)).await.unwrap().unwrap();
        assert_eq!(at.entry_date, day(3));
        assert!(store.latest_before(day(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_movement_id_conflicts() {
        let store = MemoryLedgerStore::new();
        let movement = MilkMovement::create(
            CreateMovement {
                movement_date: day(1),
                category: MovementCategory::Collected,
                volume: dec!(12),
                reference: Some("Supplier A".to_string()),
                note: None,
            },
            Utc::now(),
        )
        .unwrap();

        store.insert_movement(&movement).await.unwrap();
        let second = store.insert_movement(&movement).await;

        assert!(matches!(
            second,
            Err(LedgerError::Storage(AppError::Conflict(_)))
        ));
        let entries = store.entries_between(day(1), day(1)).await.unwrap();
        assert_eq!(entries[0].total_collected, dec!(12));
    }
}

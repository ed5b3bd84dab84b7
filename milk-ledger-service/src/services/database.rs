//! PostgreSQL store for milk-ledger-service.

use crate::error::LedgerError;
use crate::models::{
    movement_deltas, LedgerDelta, MilkLedgerEntry, MilkMovement, MovementCategory,
    UpdateMovement,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::reconciliation::apply_delta;
use crate::services::store::LedgerStore;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Advisory lock serializing every cascade across service instances.
const LEDGER_LOCK_KEY: i64 = 0x4d49_4c4b_4c45_4447;

const ENTRY_COLUMNS: &str = "entry_date, opening_balance, total_produced, total_collected, \
     total_sold, total_production_used, total_calf_consumed, total_waste, closing_balance, updated_utc";

const MOVEMENT_COLUMNS: &str =
    "movement_id, movement_date, category, volume, reference, note, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "milk-ledger-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Open a transaction holding the ledger advisory lock until commit.
    async fn begin_locked(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEDGER_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to acquire ledger lock: {}", e))
            })?;

        Ok(tx)
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }

    /// Recompute and upsert the chain for each delta inside `tx`.
    async fn apply_deltas_in(
        tx: &mut Transaction<'static, Postgres>,
        deltas: &[LedgerDelta],
    ) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        let now = Utc::now();
        let mut touched = BTreeMap::new();

        for delta in deltas {
            let prior: Option<Decimal> = sqlx::query_scalar(
                r#"
                SELECT closing_balance
                FROM milk_ledger_entries
                WHERE entry_date < $1
                ORDER BY entry_date DESC
                LIMIT 1
                "#,
            )
            .bind(delta.entry_date)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get prior balance: {}", e))
            })?;

            let tail = sqlx::query_as::<_, MilkLedgerEntry>(&format!(
                "SELECT {} FROM milk_ledger_entries WHERE entry_date >= $1 ORDER BY entry_date",
                ENTRY_COLUMNS
            ))
            .bind(delta.entry_date)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load ledger chain: {}", e))
            })?;

            let chain = apply_delta(prior, tail, *delta, now)?;
            debug!(
                entry_date = %delta.entry_date,
                category = %delta.category,
                rows = chain.len(),
                "Writing recomputed ledger chain"
            );

            for entry in chain {
                Self::upsert_entry(tx, &entry).await?;
                touched.insert(entry.entry_date, entry);
            }
        }

        Ok(touched.into_values().collect())
    }

    async fn upsert_entry(
        tx: &mut Transaction<'static, Postgres>,
        entry: &MilkLedgerEntry,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO milk_ledger_entries (
                entry_date, opening_balance, total_produced, total_collected, total_sold,
                total_production_used, total_calf_consumed, total_waste, closing_balance, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (entry_date) DO UPDATE SET
                opening_balance = EXCLUDED.opening_balance,
                total_produced = EXCLUDED.total_produced,
                total_collected = EXCLUDED.total_collected,
                total_sold = EXCLUDED.total_sold,
                total_production_used = EXCLUDED.total_production_used,
                total_calf_consumed = EXCLUDED.total_calf_consumed,
                total_waste = EXCLUDED.total_waste,
                closing_balance = EXCLUDED.closing_balance,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(entry.entry_date)
        .bind(entry.opening_balance)
        .bind(entry.total_produced)
        .bind(entry.total_collected)
        .bind(entry.total_sold)
        .bind(entry.total_production_used)
        .bind(entry.total_calf_consumed)
        .bind(entry.total_waste)
        .bind(entry.closing_balance)
        .bind(entry.updated_utc)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to write ledger entry {}: {}",
                entry.entry_date,
                e
            ))
        })?;
        Ok(())
    }

    async fn lock_movement(
        tx: &mut Transaction<'static, Postgres>,
        movement_id: Uuid,
    ) -> Result<MilkMovement, LedgerError> {
        sqlx::query_as::<_, MilkMovement>(&format!(
            "SELECT {} FROM milk_movements WHERE movement_id = $1 FOR UPDATE",
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get movement: {}", e)))?
        .ok_or(LedgerError::MovementNotFound(movement_id))
    }
}

#[async_trait]
impl LedgerStore for Database {
    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self, deltas), fields(delta_count = deltas.len()))]
    async fn apply_deltas(&self, deltas: &[LedgerDelta]) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_deltas"])
            .start_timer();

        let mut tx = self.begin_locked().await?;
        // Dropping the transaction on error rolls back every row written so far.
        let touched = Self::apply_deltas_in(&mut tx, deltas).await?;
        Self::commit(tx).await?;

        timer.observe_duration();

        Ok(touched)
    }

    #[instrument(skip(self))]
    async fn entries_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MilkLedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["entries_between"])
            .start_timer();

        let entries = sqlx::query_as::<_, MilkLedgerEntry>(&format!(
            "SELECT {} FROM milk_ledger_entries WHERE entry_date >= $1 AND entry_date <= $2 ORDER BY entry_date",
            ENTRY_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get ledger: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn latest_on_or_before(&self, date: NaiveDate) -> Result<Option<MilkLedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["latest_on_or_before"])
            .start_timer();

        let entry = sqlx::query_as::<_, MilkLedgerEntry>(&format!(
            "SELECT {} FROM milk_ledger_entries WHERE entry_date <= $1 ORDER BY entry_date DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get balance: {}", e)))?;

        timer.observe_duration();

        Ok(entry)
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.movement_id, category = %movement.category))]
    async fn insert_movement(
        &self,
        movement: &MilkMovement,
    ) -> Result<Vec<MilkLedgerEntry>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_movement"])
            .start_timer();

        let mut tx = self.begin_locked().await?;

        sqlx::query(
            r#"
            INSERT INTO milk_movements (movement_id, movement_date, category, volume, reference, note, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(movement.movement_id)
        .bind(movement.movement_date)
        .bind(movement.category.as_str())
        .bind(movement.volume)
        .bind(&movement.reference)
        .bind(&movement.note)
        .bind(movement.created_utc)
        .bind(movement.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Movement {} already exists",
                    movement.movement_id
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert movement: {}", e)),
        })?;

        let touched = Self::apply_deltas_in(&mut tx, &movement_deltas(None, Some(movement))).await?;
        Self::commit(tx).await?;

        timer.observe_duration();

        Ok(touched)
    }

    #[instrument(skip(self, patch), fields(movement_id = %movement_id))]
    async fn update_movement(
        &self,
        movement_id: Uuid,
        patch: &UpdateMovement,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_movement"])
            .start_timer();

        let mut tx = self.begin_locked().await?;
        let before = Self::lock_movement(&mut tx, movement_id).await?;
        let after = before.patched(patch, Utc::now())?;

        let updated = sqlx::query_as::<_, MilkMovement>(&format!(
            r#"
            UPDATE milk_movements
            SET movement_date = $2, category = $3, volume = $4, reference = $5, note = $6, updated_utc = $7
            WHERE movement_id = $1
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .bind(after.movement_date)
        .bind(after.category.as_str())
        .bind(after.volume)
        .bind(&after.reference)
        .bind(&after.note)
        .bind(after.updated_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update movement: {}", e)))?;

        let touched =
            Self::apply_deltas_in(&mut tx, &movement_deltas(Some(&before), Some(&updated))).await?;
        Self::commit(tx).await?;

        timer.observe_duration();

        Ok((updated, touched))
    }

    #[instrument(skip(self), fields(movement_id = %movement_id))]
    async fn delete_movement(
        &self,
        movement_id: Uuid,
    ) -> Result<(MilkMovement, Vec<MilkLedgerEntry>), LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_movement"])
            .start_timer();

        let mut tx = self.begin_locked().await?;
        let before = Self::lock_movement(&mut tx, movement_id).await?;

        sqlx::query("DELETE FROM milk_movements WHERE movement_id = $1")
            .bind(movement_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete movement: {}", e))
            })?;

        let touched = Self::apply_deltas_in(&mut tx, &movement_deltas(Some(&before), None)).await?;
        Self::commit(tx).await?;

        timer.observe_duration();

        Ok((before, touched))
    }

    #[instrument(skip(self), fields(movement_id = %movement_id))]
    async fn get_movement(&self, movement_id: Uuid) -> Result<Option<MilkMovement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_movement"])
            .start_timer();

        let movement = sqlx::query_as::<_, MilkMovement>(&format!(
            "SELECT {} FROM milk_movements WHERE movement_id = $1",
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get movement: {}", e)))?;

        timer.observe_duration();

        Ok(movement)
    }

    #[instrument(skip(self))]
    async fn list_movements(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<MovementCategory>,
    ) -> Result<Vec<MilkMovement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_movements"])
            .start_timer();

        let movements = sqlx::query_as::<_, MilkMovement>(&format!(
            r#"
            SELECT {}
            FROM milk_movements
            WHERE movement_date >= $1
              AND movement_date <= $2
              AND ($3::varchar IS NULL OR category = $3)
            ORDER BY movement_date, created_utc, movement_id
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list movements: {}", e)))?;

        timer.observe_duration();

        Ok(movements)
    }
}

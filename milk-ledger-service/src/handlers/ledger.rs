use crate::dtos::{
    AdjustmentRequest, BalanceParams, BalanceResponse, DateRangeParams, LedgerResponse,
};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

/// Apply a signed delta directly, for producers that keep their own records.
pub async fn record_adjustment(
    State(state): State<AppState>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state
        .ledger
        .record_movement(req.date, req.category, req.delta)
        .await?;

    Ok(Json(LedgerResponse { entries }))
}

pub async fn get_ledger(
    State(state): State<AppState>,
    Query(params): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state.ledger.get_ledger(params.start, params.end).await?;

    Ok(Json(LedgerResponse { entries }))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Query(params): Query<BalanceParams>,
) -> Result<impl IntoResponse, AppError> {
    let as_of = params
        .as_of
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let balance = state.ledger.get_balance_as_of(as_of).await?;

    Ok(Json(BalanceResponse { as_of, balance }))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.ledger.get_summary(params.start, params.end).await?;

    Ok(Json(summary))
}

pub async fn audit_ledger(
    State(state): State<AppState>,
    Query(params): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    let discrepancies = state.ledger.audit(params.start, params.end).await?;

    Ok(Json(discrepancies))
}

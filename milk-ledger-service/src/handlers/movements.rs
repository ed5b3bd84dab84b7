use crate::dtos::{MovementChangeResponse, MovementListParams, MovementListResponse};
use crate::models::{CreateMovement, UpdateMovement};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn create_movement(
    State(state): State<AppState>,
    Json(req): Json<CreateMovement>,
) -> Result<impl IntoResponse, AppError> {
    let change = state.ledger.create_movement(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(MovementChangeResponse::from(change)),
    ))
}

pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<MovementListParams>,
) -> Result<impl IntoResponse, AppError> {
    let movements = state
        .ledger
        .list_movements(params.start, params.end, params.category)
        .await?;

    Ok(Json(MovementListResponse::from(movements)))
}

pub async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let movement = state.ledger.get_movement(movement_id).await?;

    Ok(Json(movement))
}

pub async fn update_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
    Json(req): Json<UpdateMovement>,
) -> Result<impl IntoResponse, AppError> {
    let change = state.ledger.update_movement(movement_id, req).await?;

    Ok(Json(MovementChangeResponse::from(change)))
}

pub async fn delete_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let change = state.ledger.delete_movement(movement_id).await?;

    Ok(Json(MovementChangeResponse::from(change)))
}

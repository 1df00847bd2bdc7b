//! Maintenance endpoints: checkpoint inspection, rebuild, reset and demo data.

use crate::api::AppState;
use crate::domain::{Position, ProcessingState};
use crate::error::AppError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn get_processing_state(
    State(state): State<AppState>,
) -> Result<Json<ProcessingState>, AppError> {
    Ok(Json(state.service.processing_state().await?))
}

pub async fn force_recalculation(
    State(state): State<AppState>,
) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(state.service.force_full_recalculation().await?))
}

pub async fn load_sample_data(
    State(state): State<AppState>,
) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(state.service.load_sample_data().await?))
}

pub async fn clear_all(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.service.clear_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

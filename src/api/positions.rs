use crate::api::AppState;
use crate::domain::Position;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;

/// Current positions, security code ascending.
pub async fn get_positions(State(state): State<AppState>) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(state.service.positions().await?))
}

use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the checkpoint store answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.service.processing_state().await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}

pub async fn api_health() -> &'static str {
    "OK"
}

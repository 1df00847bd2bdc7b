use crate::api::AppState;
use crate::domain::{NewTransaction, Position, TransactionView};
use crate::error::AppError;
use crate::orchestration::ServiceError;
use axum::extract::State;
use axum::Json;
use tracing::error;

pub async fn get_transactions(
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    Ok(Json(state.service.transactions().await?))
}

/// Insert a new transaction, or edit the latest version of its trade.
///
/// Responds with all positions after recalculation.
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(incoming): Json<NewTransaction>,
) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(state.service.submit_transaction(incoming).await?))
}

/// Ingest a batch on a worker task and wait for its result.
pub async fn submit_bulk(
    State(state): State<AppState>,
    Json(batch): Json<Vec<NewTransaction>>,
) -> Result<Json<Vec<Position>>, AppError> {
    let positions = state
        .service
        .spawn_batch(batch)
        .await
        .map_err(|e| {
            error!(error = %e, "Batch worker panicked or was cancelled");
            ServiceError::Worker(e.to_string())
        })??;
    Ok(Json(positions))
}

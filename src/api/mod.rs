pub mod admin;
pub mod health;
pub mod positions;
pub mod transactions;

use crate::orchestration::LedgerService;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LedgerService>,
}

impl AppState {
    pub fn new(service: Arc<LedgerService>) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/api/health", get(health::api_health))
        .route("/api/positions", get(positions::get_positions))
        .route("/api/transactions", get(transactions::get_transactions))
        .route("/api/transaction", post(transactions::submit_transaction))
        .route("/api/transactions/bulk", post(transactions::submit_bulk))
        .route("/api/processing-state", get(admin::get_processing_state))
        .route("/api/force-recalculation", post(admin::force_recalculation))
        .route("/api/load-sample-data", post(admin::load_sample_data))
        .route("/api/clear", delete(admin::clear_all))
        .layer(cors)
        .with_state(state)
}

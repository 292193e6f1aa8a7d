//! API route definitions

use crate::handlers::{health, query};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Query routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(query::query_handler))
}

/// Liveness, readiness and counters
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
}

//! Request counting middleware
//!
//! Feeds the counters reported by `/metrics`.

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Count every request and log its outcome
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    state.record_request(status.as_u16());

    tracing::debug!(
        %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Request finished"
    );

    response
}

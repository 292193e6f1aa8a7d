//! RAG query handler

use crate::error::{AppError, AppJson};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// User's question
    #[serde(default)]
    #[schema(example = "What is the refund policy?")]
    pub query: Option<String>,
}

/// Query response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResponse {
    /// Generated answer
    #[schema(example = "You can get a refund within 30 days of purchase.")]
    pub output: String,
}

/// Answer a question from the stored documents
#[utoipa::path(
    post,
    path = "/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query answered", body = QueryResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Upstream service failed", body = crate::error::ApiError),
        (status = 500, description = "Internal error", body = crate::error::ApiError)
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let query = req
        .query
        .ok_or_else(|| AppError::Validation("query is required".to_string()))?;

    let output = state.pipeline.answer(&query).await?;

    Ok(Json(QueryResponse { output }))
}

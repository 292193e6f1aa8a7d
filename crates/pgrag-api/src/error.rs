//! API error handling

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pgrag_core::RagError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "UPSTREAM_EMBEDDING_ERROR")]
    pub code: String,
    /// Human-readable message
    #[schema(example = "Embedding service unavailable")]
    pub error: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The body could not be decoded into the expected JSON shape
    #[error("{message}")]
    BadRequest { status: StatusCode, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("embedding service failed: {0}")]
    UpstreamEmbedding(String),

    #[error("database failed: {0}")]
    UpstreamDatabase(String),

    #[error("completion service failed: {0}")]
    UpstreamCompletion(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest { status, .. } => *status,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamEmbedding(_)
            | AppError::UpstreamDatabase(_)
            | AppError::UpstreamCompletion(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest { .. } => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UpstreamEmbedding(_) => "UPSTREAM_EMBEDDING_ERROR",
            AppError::UpstreamDatabase(_) => "UPSTREAM_DATABASE_ERROR",
            AppError::UpstreamCompletion(_) => "UPSTREAM_COMPLETION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest { message, .. } => message.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::UpstreamEmbedding(_) => "Embedding service unavailable".to_string(),
            AppError::UpstreamDatabase(_) => "Vector store unavailable".to_string(),
            AppError::UpstreamCompletion(_) => "Completion service unavailable".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Full detail stays in the server log
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.error_code(), error = %self, "Request rejected");
        }

        let body = ApiError::new(self.error_code(), self.public_message());
        (status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(msg) => AppError::Validation(msg),
            RagError::UpstreamEmbedding(msg) => AppError::UpstreamEmbedding(msg),
            RagError::UpstreamDatabase(msg) => AppError::UpstreamDatabase(msg),
            RagError::UpstreamCompletion(msg) => AppError::UpstreamCompletion(msg),
            RagError::Config(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            RagError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// `Json` extractor whose rejection is rendered as an [`ApiError`] body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

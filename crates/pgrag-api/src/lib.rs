//! pgrag API - HTTP query server
//!
//! Serves `POST /query` on top of the retrieval pipeline, plus liveness,
//! readiness and counter endpoints.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, middleware::from_fn_with_state, routing::get, Json, Router};
use pgrag_core::config::ServerConfig;
pub use pgrag_core::logging::init_tracing;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

/// OpenAPI document for the public endpoints
#[derive(OpenApi)]
#[openapi(
    info(title = "pgrag API", description = "Retrieval-augmented question answering over pgvector"),
    paths(
        handlers::query::query_handler,
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::health::metrics,
    ),
    components(schemas(
        handlers::query::QueryRequest,
        handlers::query::QueryResponse,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::MetricsResponse,
        error::ApiError,
    )),
    tags(
        (name = "query", description = "Question answering"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = state.config.server.clone();

    let router = Router::new()
        .merge(routes::api_routes())
        .merge(routes::health_routes())
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(server.max_body_size))
        // Outermost so timeouts and oversized bodies are counted too
        .layer(from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .with_state(state);

    let router = match cors_layer(&server) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    if !config.cors_enabled {
        return None;
    }

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_origins.is_empty() {
        return Some(layer.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(layer.allow_origin(origins))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_disabled_by_default() {
        assert!(cors_layer(&ServerConfig::default()).is_none());

        let config = ServerConfig {
            cors_enabled: true,
            cors_origins: vec!["http://localhost:3000".to_string()],
            ..Default::default()
        };
        assert!(cors_layer(&config).is_some());
    }

    #[test]
    fn test_openapi_lists_query_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/query"));
        assert!(doc.paths.paths.contains_key("/ready"));
    }
}

//! pgrag API Server
//!
//! Answers questions over the documents stored in PostgreSQL/pgvector.

use anyhow::Context;
use pgrag_api::{create_router, init_tracing, state::AppState};
use pgrag_core::config::AppConfig;
use pgrag_rag::{create_completion_client, PipelineSettings, RagPipeline};
use pgrag_vector::{create_embedding_client, PgVectorStore};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        embedding_model = %config.llm.embedding_model,
        table = %config.database.table,
        "Configuration loaded"
    );

    let embedder = create_embedding_client(&config.llm, config.database.vector_dimension)?;
    let llm = create_completion_client(&config.llm)?;

    // Connections are opened on first use so the server starts without the database
    let store = Arc::new(PgVectorStore::connect_lazy(&config.database)?);

    let pipeline = RagPipeline::new(
        Arc::from(embedder),
        store.clone(),
        Arc::from(llm),
        PipelineSettings::from(&config.rag),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, Arc::new(pipeline)).with_probe(store));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("pgrag API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Optional TOML file from `PGRAG_CONFIG`, overlaid with the environment
fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("PGRAG_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

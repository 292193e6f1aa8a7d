//! Application state management

use async_trait::async_trait;
use pgrag_core::config::AppConfig;
use pgrag_rag::RagPipeline;
use pgrag_vector::PgVectorStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Dependency check used by the readiness probe
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Name reported under `checks` in the readiness response
    fn name(&self) -> &str;

    async fn is_ready(&self) -> bool;
}

#[async_trait]
impl ReadinessProbe for PgVectorStore {
    fn name(&self) -> &str {
        "database"
    }

    async fn is_ready(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Database readiness check failed");
                false
            }
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Query pipeline
    pub pipeline: Arc<RagPipeline>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    request_count: AtomicU64,
    /// Requests answered with a 4xx/5xx status
    failed_count: AtomicU64,
    probes: Vec<Arc<dyn ReadinessProbe>>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: AppConfig, pipeline: Arc<RagPipeline>) -> Self {
        Self {
            config,
            pipeline,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            probes: Vec::new(),
        }
    }

    /// Register a dependency checked by `/ready`
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Count a finished request by its response status
    pub fn record_request(&self, status: u16) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if status >= 400 {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn get_failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Run every registered probe, in registration order
    pub async fn readiness(&self) -> Vec<(String, bool)> {
        let mut checks = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            checks.push((probe.name().to_string(), probe.is_ready().await));
        }
        checks
    }
}

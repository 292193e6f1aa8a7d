//! PostgreSQL + pgvector chunk store
//!
//! Similarity search and ingestion over a single table with an `original`
//! text column and an `embedding` vector column.

use async_trait::async_trait;
use pgrag_core::config::is_sql_identifier;
use pgrag_core::{ChunkStore, DatabaseConfig, Embedding, RagError, Result, RetrievedRecord};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;

/// pgvector-backed store
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    dimension: usize,
    nearest_sql: String,
}

/// Row returned by the similarity query
#[derive(Debug, FromRow)]
struct NearestRow {
    original: Option<String>,
    distance: Option<f64>,
}

impl From<NearestRow> for RetrievedRecord {
    fn from(row: NearestRow) -> Self {
        RetrievedRecord {
            original: row.original.unwrap_or_default(),
            distance: row.distance,
        }
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
}

fn nearest_query(table: &str) -> String {
    format!(
        "SELECT original, (embedding <-> $1::vector)::float8 AS distance \
         FROM {table} ORDER BY embedding <-> $1::vector LIMIT $2"
    )
}

impl PgVectorStore {
    /// Connect eagerly, failing if the database cannot be reached
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = pool_options(config)
            .connect(&config.postgres_url)
            .await
            .map_err(|e| RagError::UpstreamDatabase(format!("PostgreSQL connection failed: {e}")))?;

        Self::from_pool(pool, &config.table, config.vector_dimension)
    }

    /// Create a pool that opens connections on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = pool_options(config)
            .connect_lazy(&config.postgres_url)
            .map_err(|e| RagError::Config(format!("Invalid PostgreSQL URL: {e}")))?;

        Self::from_pool(pool, &config.table, config.vector_dimension)
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool, table: &str, dimension: usize) -> Result<Self> {
        if !is_sql_identifier(table) {
            return Err(RagError::Config(format!("Invalid table name: {table:?}")));
        }

        Ok(Self {
            pool,
            table: table.to_string(),
            dimension,
            nearest_sql: nearest_query(table),
        })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the pgvector extension and the chunk table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RagError::UpstreamDatabase(format!("Failed to create vector extension: {e}"))
            })?;

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id BIGSERIAL PRIMARY KEY, \
                original TEXT NOT NULL, \
                embedding vector({}) NOT NULL\
            )",
            self.table, self.dimension
        );
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::UpstreamDatabase(format!("Failed to create table: {e}")))?;

        tracing::info!(table = %self.table, dimension = self.dimension, "Schema ready");
        Ok(())
    }

    /// Store one chunk and return its row id
    pub async fn insert(&self, original: &str, embedding: &Embedding) -> Result<i64> {
        if embedding.len() != self.dimension {
            return Err(RagError::Validation(format!(
                "embedding has {} dimensions, table expects {}",
                embedding.len(),
                self.dimension
            )));
        }

        let sql = format!(
            "INSERT INTO {} (original, embedding) VALUES ($1, $2::vector) RETURNING id",
            self.table
        );
        let row: (i64,) = sqlx::query_as(&sql)
            .bind(original)
            .bind(embedding.to_pgvector_literal())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RagError::UpstreamDatabase(format!("Failed to insert chunk: {e}")))?;

        Ok(row.0)
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::UpstreamDatabase(format!("Ping failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for PgVectorStore {
    async fn nearest(&self, embedding: &Embedding, limit: usize) -> Result<Vec<RetrievedRecord>> {
        // The checked-out connection goes back to the pool when `conn` drops,
        // whether the query below succeeds or not.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RagError::UpstreamDatabase(format!("Failed to acquire connection: {e}")))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<NearestRow> = sqlx::query_as(&self.nearest_sql)
            .bind(embedding.to_pgvector_literal())
            .bind(limit)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| RagError::UpstreamDatabase(format!("Similarity query failed: {e}")))?;

        Ok(rows.into_iter().map(RetrievedRecord::from).collect())
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}

// ============================================================================
// Tests
// ============================================================================

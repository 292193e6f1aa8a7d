//! pgrag Core - Domain types, error taxonomy and service traits
//!
//! This crate defines the abstractions shared by every other pgrag crate:
//! - Query, embedding, retrieved-record and prompt types
//! - The error taxonomy of the query pipeline
//! - Traits for the three external collaborators (embedding, store, completion)
//! - Configuration management and tracing setup

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, LlmConfig, LlmProvider, LoggingConfig, RagConfig,
    ServerConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors produced while answering a query
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding service error: {0}")]
    UpstreamEmbedding(String),

    #[error("Database error: {0}")]
    UpstreamDatabase(String),

    #[error("Completion service error: {0}")]
    UpstreamCompletion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UpstreamEmbedding(_) => "upstream_embedding",
            Self::UpstreamDatabase(_) => "upstream_database",
            Self::UpstreamCompletion(_) => "upstream_completion",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }

    /// Whether the failure originated in one of the external services
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamEmbedding(_) | Self::UpstreamDatabase(_) | Self::UpstreamCompletion(_)
        )
    }
}

impl From<ConfigError> for RagError {
    fn from(err: ConfigError) -> Self {
        RagError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Query Models
// ============================================================================

/// A user query after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Validate raw user input.
    ///
    /// The text must contain something other than whitespace and be at most
    /// `max_chars` characters long (`0` disables the length check). The
    /// original text is kept as-is, surrounding whitespace included.
    pub fn parse(raw: impl Into<String>, max_chars: usize) -> Result<Self> {
        let raw = raw.into();

        if raw.trim().is_empty() {
            return Err(RagError::Validation("query cannot be empty".to_string()));
        }

        if max_chars > 0 {
            let len = raw.chars().count();
            if len > max_chars {
                return Err(RagError::Validation(format!(
                    "query is {len} characters long, the limit is {max_chars}"
                )));
            }
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Query {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Vector representation of a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Check the vector has the expected length and only finite components
    pub fn check(&self, expected_dimension: usize) -> Result<()> {
        if self.0.len() != expected_dimension {
            return Err(RagError::UpstreamEmbedding(format!(
                "expected {expected_dimension} dimensions, got {}",
                self.0.len()
            )));
        }
        if let Some(pos) = self.0.iter().position(|v| !v.is_finite()) {
            return Err(RagError::UpstreamEmbedding(format!(
                "non-finite value at position {pos}"
            )));
        }
        Ok(())
    }

    /// Text form accepted by pgvector, e.g. `[0.1,-0.25,3]`
    pub fn to_pgvector_literal(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 12 + 2);
        out.push('[');
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&v.to_string());
        }
        out.push(']');
        out
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// A stored chunk returned by the similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRecord {
    /// Original chunk text
    pub original: String,

    /// Distance to the query embedding (smaller is closer)
    pub distance: Option<f64>,
}

impl RetrievedRecord {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            distance: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// Prompt sent to the completion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System-level instructions describing the assistant's role
    pub instructions: String,

    /// User-turn text: retrieved context followed by the query
    pub input: String,
}

impl Prompt {
    /// Total length in bytes of both parts
    pub fn len(&self) -> usize {
        self.instructions.len() + self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.input.is_empty()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Produces embeddings for text
#[async_trait::async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Number of dimensions requested from the service
    fn dimension(&self) -> usize;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

/// Similarity search over stored chunks
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Return at most `limit` records, closest first
    async fn nearest(&self, embedding: &Embedding, limit: usize) -> Result<Vec<RetrievedRecord>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Text generation
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate an answer for the prompt
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rejects_blank_input() {
        assert!(matches!(Query::parse("", 100), Err(RagError::Validation(_))));
        assert!(matches!(
            Query::parse("  \n\t ", 100),
            Err(RagError::Validation(_))
        ));
    }

    #[test]
    fn test_query_length_limit() {
        assert!(Query::parse("abcd", 4).is_ok());
        assert!(matches!(Query::parse("abcde", 4), Err(RagError::Validation(_))));
        // multi-byte characters count once
        assert!(Query::parse("äöüß", 4).is_ok());
        // zero disables the check
        assert!(Query::parse("a".repeat(10_000), 0).is_ok());
    }

    #[test]
    fn test_query_keeps_original_text() {
        let query = Query::parse("  What is the refund policy? ", 0).unwrap();
        assert_eq!(query.as_str(), "  What is the refund policy? ");
    }

    #[test]
    fn test_pgvector_literal() {
        let embedding = Embedding::new(vec![0.1, -0.25, 3.0]);
        assert_eq!(embedding.to_pgvector_literal(), "[0.1,-0.25,3]");
        assert_eq!(Embedding::new(vec![]).to_pgvector_literal(), "[]");
    }

    #[test]
    fn test_pgvector_literal_is_json_array() {
        let embedding = Embedding::new(vec![0.5, 1.0, -2.0]);
        let parsed: Vec<f32> = serde_json::from_str(&embedding.to_pgvector_literal()).unwrap();
        assert_eq!(parsed, embedding.into_inner());
    }

    #[test]
    fn test_embedding_check() {
        let embedding = Embedding::new(vec![0.0; 768]);
        assert!(embedding.check(768).is_ok());
        assert!(matches!(
            embedding.check(1536),
            Err(RagError::UpstreamEmbedding(_))
        ));

        let bad = Embedding::new(vec![0.0, f32::NAN]);
        assert!(matches!(bad.check(2), Err(RagError::UpstreamEmbedding(_))));
    }

    #[test]
    fn test_error_kinds() {
        assert!(RagError::UpstreamDatabase("x".into()).is_upstream());
        assert!(!RagError::Validation("x".into()).is_upstream());
        assert_eq!(
            RagError::UpstreamCompletion("x".into()).kind(),
            "upstream_completion"
        );
    }
}

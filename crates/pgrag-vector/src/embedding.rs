//! Embedding clients for generating query vectors
//!
//! Supports the OpenAI and Ollama embedding APIs.

use async_trait::async_trait;
use pgrag_core::{Embedding, EmbeddingClient, LlmConfig, LlmProvider, RagError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Build the shared HTTP client with the configured request timeout
fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'static str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig, dimension: usize) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| RagError::Config("OpenAI API key required".to_string()))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            dimension,
        })
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn request<'a>(&'a self, text: &'a str) -> OpenAiEmbeddingRequest<'a> {
        OpenAiEmbeddingRequest {
            model: &self.model,
            input: text,
            encoding_format: "float",
            dimensions: self.dimension,
        }
    }
}

fn parse_openai_embedding(body: &[u8]) -> Result<Embedding> {
    let result: OpenAiEmbeddingResponse = serde_json::from_slice(body).map_err(|e| {
        RagError::UpstreamEmbedding(format!("Failed to parse embedding response: {e}"))
    })?;

    result
        .data
        .into_iter()
        .next()
        .map(|d| Embedding::new(d.embedding))
        .ok_or_else(|| RagError::UpstreamEmbedding("No embedding returned".to_string()))
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(text))
            .send()
            .await
            .map_err(|e| RagError::UpstreamEmbedding(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamEmbedding(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RagError::UpstreamEmbedding(format!("Failed to read response: {e}")))?;

        let embedding = parse_openai_embedding(&body)?;
        embedding.check(self.dimension)?;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig, dimension: usize) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RagError::UpstreamEmbedding(format!("Ollama embedding request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamEmbedding(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            RagError::UpstreamEmbedding(format!("Failed to parse embedding response: {e}"))
        })?;

        let embedding = Embedding::new(result.embedding);
        embedding.check(self.dimension)?;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(
    config: &LlmConfig,
    dimension: usize,
) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiEmbedding::from_config(config, dimension)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config, dimension)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_request_body() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small", 768);
        let body = serde_json::to_value(client.request("What is the refund policy?")).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "model": "text-embedding-3-small",
                "input": "What is the refund policy?",
                "encoding_format": "float",
                "dimensions": 768,
            })
        );
    }

    #[test]
    fn test_parse_openai_embedding() {
        let body = br#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.5, -0.25]}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 5, "total_tokens": 5}
        }"#;

        let embedding = parse_openai_embedding(body).unwrap();
        assert_eq!(embedding.as_slice(), &[0.5, -0.25]);
    }

    #[test]
    fn test_parse_openai_embedding_empty_data() {
        let err = parse_openai_embedding(br#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, RagError::UpstreamEmbedding(_)));

        let err = parse_openai_embedding(b"not json").unwrap_err();
        assert!(matches!(err, RagError::UpstreamEmbedding(_)));
    }

    #[test]
    fn test_factory_requires_api_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            create_embedding_client(&config, 768),
            Err(RagError::Config(_))
        ));

        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            embedding_model: "nomic-embed-text".to_string(),
            ..Default::default()
        };
        let client = create_embedding_client(&config, 768).unwrap();
        assert_eq!(client.dimension(), 768);
        assert_eq!(client.model(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_upstream_error() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = OllamaEmbedding::new("http://127.0.0.1:9", "nomic-embed-text", 768);
        let err = tokio_test::assert_err!(client.embed("hello").await);
        assert!(matches!(err, RagError::UpstreamEmbedding(_)));
    }
}

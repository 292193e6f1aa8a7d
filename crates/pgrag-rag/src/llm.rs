//! Completion client implementations
//!
//! Provides the OpenAI Responses API and Ollama generate API behind the
//! `CompletionClient` trait.

use async_trait::async_trait;
use pgrag_core::{CompletionClient, LlmConfig, LlmProvider, Prompt, RagError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI Responses API client
pub struct OpenAiCompletion {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesResponse {
    /// Concatenated text of every `output_text` part of every message item
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

fn parse_responses_output(body: &[u8]) -> Result<String> {
    let result: ResponsesResponse = serde_json::from_slice(body)
        .map_err(|e| RagError::UpstreamCompletion(format!("Failed to parse response: {e}")))?;

    let text = result.output_text();
    if text.trim().is_empty() {
        return Err(RagError::UpstreamCompletion(
            "No response generated".to_string(),
        ));
    }
    Ok(text)
}

impl OpenAiCompletion {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| RagError::Config("OpenAI API key required".to_string()))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn request<'a>(&'a self, prompt: &'a Prompt) -> ResponsesRequest<'a> {
        ResponsesRequest {
            model: &self.model,
            instructions: &prompt.instructions,
            input: &prompt.input,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| RagError::UpstreamCompletion(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamCompletion(format!(
                "OpenAI error ({status}): {error_text}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RagError::UpstreamCompletion(format!("Failed to read response: {e}")))?;

        parse_responses_output(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaCompletion {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

fn parse_ollama_output(body: &[u8]) -> Result<String> {
    let result: OllamaResponse = serde_json::from_slice(body).map_err(|e| {
        RagError::UpstreamCompletion(format!("Failed to parse Ollama response: {e}"))
    })?;

    if result.response.trim().is_empty() {
        return Err(RagError::UpstreamCompletion(
            "No response generated".to_string(),
        ));
    }
    Ok(result.response)
}

impl OllamaCompletion {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OllamaCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            system: &prompt.instructions,
            prompt: &prompt.input,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::UpstreamCompletion(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamCompletion(format!(
                "Ollama error: {error_text}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RagError::UpstreamCompletion(format!("Failed to read response: {e}")))?;

        parse_ollama_output(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a completion client from config
pub fn create_completion_client(config: &LlmConfig) -> Result<Box<dyn CompletionClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiCompletion::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaCompletion::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            instructions: "Be helpful.".to_string(),
            input: "# Retrieved context:\nA\n# User query:\nQ".to_string(),
        }
    }

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiCompletion::new("test-key", "gpt-4.1");
        assert_eq!(client.model(), "gpt-4.1");
    }

    #[test]
    fn test_responses_request_body() {
        let client = OpenAiCompletion::new("test-key", "gpt-4.1");
        let prompt = prompt();
        let body = serde_json::to_value(client.request(&prompt)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4.1",
                "instructions": "Be helpful.",
                "input": "# Retrieved context:\nA\n# User query:\nQ",
            })
        );
    }

    #[test]
    fn test_parse_responses_output() {
        let body = br#"{
            "id": "resp_1",
            "object": "response",
            "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        {"type": "output_text", "text": "You can get a refund ", "annotations": []},
                        {"type": "output_text", "text": "within 30 days.", "annotations": []}
                    ]
                }
            ]
        }"#;

        assert_eq!(
            parse_responses_output(body).unwrap(),
            "You can get a refund within 30 days."
        );
    }

    #[test]
    fn test_parse_responses_without_text() {
        let body = br#"{"output": [{"type": "message", "content": [{"type": "refusal", "refusal": "no"}]}]}"#;
        assert!(matches!(
            parse_responses_output(body),
            Err(RagError::UpstreamCompletion(_))
        ));
    }

    #[test]
    fn test_parse_ollama_output() {
        let body = br#"{"model": "llama3", "response": "Refunds within 30 days.", "done": true}"#;
        assert_eq!(
            parse_ollama_output(body).unwrap(),
            "Refunds within 30 days."
        );
    }

    #[test]
    fn test_parse_ollama_without_text() {
        let bodies: [&[u8]; 3] = [
            br#"{"model": "llama3", "response": "", "done": true}"#,
            br#"{"model": "llama3", "response": "  \n", "done": true}"#,
            br#"{"error": "model not found"}"#,
        ];

        for body in bodies {
            assert!(matches!(
                parse_ollama_output(body),
                Err(RagError::UpstreamCompletion(_))
            ));
        }
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaCompletion::new("http://localhost:11434", "llama3");
        assert_eq!(client.model(), "llama3");
    }

    #[test]
    fn test_factory() {
        assert!(matches!(
            create_completion_client(&LlmConfig::default()),
            Err(RagError::Config(_))
        ));

        let config = LlmConfig {
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let client = create_completion_client(&config).unwrap();
        assert_eq!(client.model(), "gpt-4.1");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_upstream_error() {
        let client = OllamaCompletion::new("http://127.0.0.1:9", "llama3");
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::UpstreamCompletion(_)));
    }
}

//! pgrag RAG - Retrieval-Augmented Generation pipeline
//!
//! A query is answered in one linear pass:
//! 1. embed the query text
//! 2. fetch the nearest stored chunks from the vector store
//! 3. join the chunk texts into a context block
//! 4. ask the completion model with fixed instructions, the context and the query
//!
//! The three collaborators are injected as trait objects so the pipeline can
//! run against test doubles as well as the real services.

use pgrag_core::{
    ChunkStore, CompletionClient, EmbeddingClient, Prompt, Query, RagConfig, Result,
    RetrievedRecord,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub mod llm;

pub use llm::{create_completion_client, OllamaCompletion, OpenAiCompletion};

// ============================================================================
// Prompt Assembly
// ============================================================================

/// System-level instructions sent with every completion request
pub const SYSTEM_INSTRUCTIONS: &str = "You are a helpful AI assistant that answers questions \
using retrieved information from a knowledge base. Your primary goal is to provide accurate, \
well-sourced responses based on the retrieved context while being transparent about the \
limitations of your knowledge.";

/// Separator placed between retrieved chunk texts
pub const CONTEXT_SEPARATOR: &str = "\n\n\n\n";

/// Join the `original` texts of the records in the order given.
///
/// With a non-zero `max_chars`, segments are taken whole and in order until
/// the next one would push the context past the limit.
pub fn join_context(records: &[RetrievedRecord], max_chars: usize) -> String {
    let separator_len = CONTEXT_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut len = 0;

    for (i, record) in records.iter().enumerate() {
        let added = record.original.chars().count() + if i > 0 { separator_len } else { 0 };
        if max_chars > 0 && len + added > max_chars {
            tracing::debug!(
                kept = i,
                dropped = records.len() - i,
                max_chars,
                "Context limit reached"
            );
            break;
        }
        if i > 0 {
            context.push_str(CONTEXT_SEPARATOR);
        }
        context.push_str(&record.original);
        len += added;
    }

    context
}

/// Build the completion prompt from the joined context and the query
pub fn build_prompt(context: &str, query: &Query) -> Prompt {
    Prompt {
        instructions: SYSTEM_INSTRUCTIONS.to_string(),
        input: format!(
            "# Retrieved context:\n{context}\n# User query:\n{}",
            query.as_str()
        ),
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Per-query knobs of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Number of rows requested from the store
    pub top_k: usize,

    /// Maximum query length in characters (0 = unlimited)
    pub max_query_chars: usize,

    /// Maximum context length in characters (0 = unlimited)
    pub max_context_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for PipelineSettings {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            max_query_chars: config.max_query_chars,
            max_context_chars: config.max_context_chars,
        }
    }
}

/// Answer one query.
///
/// Any failure aborts the remaining steps: a failed embedding means no
/// database query and no completion, a failed database query means no
/// completion.
pub async fn run_pipeline(
    raw_query: &str,
    embedder: &dyn EmbeddingClient,
    store: &dyn ChunkStore,
    llm: &dyn CompletionClient,
    settings: &PipelineSettings,
) -> Result<String> {
    let start_time = Instant::now();
    let query = Query::parse(raw_query, settings.max_query_chars)?;

    let embedding = embedder.embed(query.as_str()).await?;
    tracing::debug!(
        model = embedder.model(),
        dimension = embedding.len(),
        "Query embedded"
    );

    let records = store.nearest(&embedding, settings.top_k).await?;
    tracing::debug!(
        backend = store.name(),
        rows = records.len(),
        limit = settings.top_k,
        "Nearest chunks retrieved"
    );

    let context = join_context(&records, settings.max_context_chars);
    let prompt = build_prompt(&context, &query);
    tracing::debug!(prompt_len = prompt.len(), "Prompt assembled");

    let output = llm.complete(&prompt).await?;

    tracing::info!(
        model = llm.model(),
        rows = records.len(),
        output_len = output.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "RAG query answered"
    );

    Ok(output)
}

/// The query pipeline bound to its collaborators
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn ChunkStore>,
    llm: Arc<dyn CompletionClient>,
    settings: PipelineSettings,
}

impl RagPipeline {
    /// Create a new pipeline
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn ChunkStore>,
        llm: Arc<dyn CompletionClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer a query inside its own tracing span
    pub async fn answer(&self, query: &str) -> Result<String> {
        let span = tracing::info_span!("rag_query", request_id = %Uuid::new_v4());

        run_pipeline(
            query,
            self.embedder.as_ref(),
            self.store.as_ref(),
            self.llm.as_ref(),
            &self.settings,
        )
        .instrument(span)
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================

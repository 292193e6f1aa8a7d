//! pgrag CLI - Command-line interface
//!
//! Usage:
//!   pgrag init-db
//!   pgrag ingest <path>
//!   pgrag query <question>
//!   pgrag config

use anyhow::Context;
use clap::{Parser, Subcommand};
use pgrag_core::config::AppConfig;
use pgrag_core::logging::init_tracing;
use pgrag_rag::{create_completion_client, PipelineSettings, RagPipeline};
use pgrag_vector::{chunk_text, create_embedding_client, ChunkConfig, PgVectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// File extensions picked up when ingesting a directory
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

#[derive(Parser)]
#[command(name = "pgrag")]
#[command(about = "Question answering over documents stored in pgvector")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables still take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the pgvector extension and the documents table
    InitDb,
    /// Chunk, embed and store text documents
    Ingest {
        /// File or directory of .txt / .md documents
        path: PathBuf,
    },
    /// Ask a question against the stored documents
    Query {
        /// Question to ask
        question: String,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    match cli.command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("failed to render configuration")?;
            println!("{rendered}");
        }
        Commands::InitDb => {
            config.validate().context("invalid configuration")?;
            let store = PgVectorStore::connect(&config.database).await?;
            store.ensure_schema().await?;
            println!(
                "Table '{}' ready (vector dimension {})",
                store.table(),
                config.database.vector_dimension
            );
        }
        Commands::Ingest { path } => {
            config.validate().context("invalid configuration")?;
            let written = ingest(&config, &path).await?;
            println!("Ingested {written} chunks from {}", path.display());
        }
        Commands::Query { question } => {
            config.validate().context("invalid configuration")?;
            let answer = query(&config, &question).await?;
            println!("{answer}");
        }
    }

    Ok(())
}

async fn query(config: &AppConfig, question: &str) -> anyhow::Result<String> {
    let embedder = create_embedding_client(&config.llm, config.database.vector_dimension)?;
    let llm = create_completion_client(&config.llm)?;
    let store = PgVectorStore::connect(&config.database).await?;

    let pipeline = RagPipeline::new(
        Arc::from(embedder),
        Arc::new(store),
        Arc::from(llm),
        PipelineSettings::from(&config.rag),
    );

    Ok(pipeline.answer(question).await?)
}

/// Returns the number of rows written
async fn ingest(config: &AppConfig, path: &Path) -> anyhow::Result<usize> {
    let files = collect_documents(path)?;
    if files.is_empty() {
        anyhow::bail!("no .txt or .md documents found at {}", path.display());
    }

    let embedder = create_embedding_client(&config.llm, config.database.vector_dimension)?;
    let store = PgVectorStore::connect(&config.database).await?;
    store.ensure_schema().await?;

    let chunk_config = ChunkConfig::from(&config.rag);
    let mut written = 0;

    for file in files {
        let text = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;

        let chunks = chunk_text(&text, &chunk_config);
        tracing::info!(file = %file.display(), chunks = chunks.len(), "Ingesting document");

        for chunk in &chunks {
            let embedding = embedder.embed(chunk).await?;
            store.insert(chunk, &embedding).await?;
            written += 1;
        }
    }

    Ok(written)
}

/// Text documents under `path`, sorted. Symlinks are not followed, so a
/// link cycle cannot yield the same document twice.
fn collect_documents(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(path) {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        if entry.file_type().is_file() && is_text_document(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn is_text_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_config_flag() {
        let cli = Cli::try_parse_from([
            "pgrag",
            "query",
            "What is the refund policy?",
            "--config",
            "pgrag.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("pgrag.toml")));
        match cli.command {
            Commands::Query { question } => assert_eq!(question, "What is the refund policy?"),
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_is_text_document() {
        assert!(is_text_document(Path::new("docs/refunds.md")));
        assert!(is_text_document(Path::new("POLICY.TXT")));
        assert!(!is_text_document(Path::new("scan.pdf")));
        assert!(!is_text_document(Path::new("README")));
    }

    #[test]
    fn test_collect_documents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let nested = root.join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("a.txt"), "Refunds within 30 days.").unwrap();
        std::fs::write(nested.join("b.md"), "Store credit after 30 days.").unwrap();
        std::fs::write(root.join("image.png"), [0u8; 4]).unwrap();

        let files = collect_documents(root).unwrap();
        assert_eq!(files, vec![root.join("a.txt"), nested.join("b.md")]);

        let single = collect_documents(&root.join("a.txt")).unwrap();
        assert_eq!(single, vec![root.join("a.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_documents_ignores_symlink_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("a.txt"), "Refunds within 30 days.").unwrap();
        std::os::unix::fs::symlink(root, root.join("loop")).unwrap();
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("alias.txt")).unwrap();

        let files = collect_documents(root).unwrap();
        assert_eq!(files, vec![root.join("a.txt")]);
    }

    #[test]
    fn test_collect_documents_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_documents(&dir.path().join("absent")).is_err());
    }
}

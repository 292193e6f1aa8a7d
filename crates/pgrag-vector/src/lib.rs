//! pgrag Vector - Embeddings and pgvector storage
//!
//! Provides the embedding clients that turn text into vectors and the
//! PostgreSQL/pgvector store that ranks stored chunks by distance.

pub mod chunker;
pub mod embedding;
pub mod pg_store;

pub use chunker::{chunk_text, ChunkConfig};
pub use embedding::{create_embedding_client, OllamaEmbedding, OpenAiEmbedding};
pub use pg_store::PgVectorStore;

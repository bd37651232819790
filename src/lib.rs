//! RAPTOR-based retrieval-augmented generation core.
//!
//! Ingests long documents, builds a hierarchical abstractive summary tree
//! over their chunks (RAPTOR: Recursive Abstractive Processing for
//! Tree-Organized Retrieval), persists chunks, embeddings, and tree nodes
//! in Postgres with `pgvector`, and serves similarity-based retrieval over
//! that tree.
//!
//! # Modules
//!
//! - [`config`] — configuration loading and validation
//! - [`db`] — relational persistence (documents, chunks, trees, embeddings)
//! - [`error`] — structured error taxonomy shared across the core
//! - [`gateways`] — rate-limited provider clients (embedding, summarizer)
//!   plus the model registry and reranker hook
//! - [`ids`] — deterministic ID schemes for trees, nodes, and embeddings
//! - [`raptor`] — the chunker, clusterer, tree builder, and retrieval engine
//!
//! # Example
//!
//! ```no_run
//! use raptor_rag::config::AppConfig;
//! use raptor_rag::db::Database;
//! use raptor_rag::gateways::{EmbeddingGateway, SummarizerGateway};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let db = Database::connect(&config.database, config.embedding.dimension).await?;
//! let embedder = EmbeddingGateway::new(&config.embedding)?;
//! let summarizer = SummarizerGateway::new(&config.summarizer, config.raptor.rpm_limit, config.raptor.llm_concurrency, 8192)?;
//! # let _ = (db, embedder, summarizer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod gateways;
pub mod ids;
pub mod raptor;

pub use db::Database;
pub use error::{RaptorError, Result};
pub use raptor::{build_tree, ingest_chunks_and_embeddings, retrieve, RetrievalMode, RetrievalRequest, RetrievalResponse};

//! RAPTOR RAG service CLI: ingest a document, build its tree, and query it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raptor_rag::config::AppConfig;
use raptor_rag::db::{Chunk, Database, Document};
use raptor_rag::gateways::{EmbeddingGateway, NoopReranker, SummarizerGateway};
use raptor_rag::raptor::{build_tree, chunk, ingest_chunks_and_embeddings, retrieve, ChunkerConfig, RetrievalMode, RetrievalRequest};

#[derive(Parser, Debug)]
#[command(name = "raptor-rag")]
#[command(author = "MadKoding")]
#[command(version = "0.1.0")]
#[command(about = "RAPTOR-based retrieval-augmented generation service", long_about = None)]
struct Args {
    /// Configuration file path (overrides the default search path)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed, and ingest a document, then build its RAPTOR tree
    Build {
        /// Document identifier
        document_id: String,
        /// Dataset identifier (logical partition)
        dataset_id: String,
        /// Path to the document's text file
        path: PathBuf,
        #[arg(long, default_value_t = 1200)]
        chunk_size: usize,
        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,
    },
    /// Retrieve chunks for a natural-language query
    Retrieve {
        dataset_id: String,
        query: String,
        #[arg(long, default_value = "collapsed")]
        mode: String,
        #[arg(long, default_value_t = 8)]
        top_k: usize,
        #[arg(long, default_value_t = 5)]
        expand_k: usize,
        #[arg(long, default_value_t = 0)]
        levels_cap: usize,
    },
    /// Apply pending schema migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = AppConfig::load(args.config.as_deref())?;
    let db = Database::connect(&config.database, config.embedding.dimension).await?;

    match args.command {
        Command::Migrate => {
            tracing::info!("schema migrations applied");
            println!("migrations applied");
        }
        Command::Build { document_id, dataset_id, path, chunk_size, chunk_overlap } => {
            let text = std::fs::read_to_string(&path)?;
            let chunker_config = ChunkerConfig::new(chunk_size, chunk_overlap, false, None);
            let texts = chunk(&text, &chunker_config);
            if texts.is_empty() {
                anyhow::bail!("no chunks produced from {:?}", path);
            }

            let embedder = EmbeddingGateway::new(&config.embedding)?;
            let summarizer = SummarizerGateway::new(
                &config.summarizer,
                config.raptor.rpm_limit,
                config.raptor.llm_concurrency,
                8192,
            )?;

            let chunks: Vec<Chunk> = texts
                .iter()
                .enumerate()
                .map(|(idx, text)| Chunk::new(format!("{document_id}::chunk::{idx:06}"), &document_id, idx as i32, text.clone()))
                .collect();

            tracing::info!(count = chunks.len(), "embedding leaf chunks");
            let leaf_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let leaf_vectors = embedder.embed_documents(&leaf_texts).await?;

            let document = Document::new(&document_id, &dataset_id);
            ingest_chunks_and_embeddings(&db, &document, &chunks, &leaf_vectors, &config.embedding.model).await?;

            tracing::info!("building RAPTOR tree");
            let tree_id = build_tree(
                &db,
                &embedder,
                &summarizer,
                &document_id,
                &dataset_id,
                &chunks,
                &leaf_vectors,
                &config.raptor,
            )
            .await?;

            println!("tree_id: {tree_id}");
        }
        Command::Retrieve { dataset_id, query, mode, top_k, expand_k, levels_cap } => {
            let embedder = EmbeddingGateway::new(&config.embedding)?;
            let summarizer = SummarizerGateway::new(
                &config.summarizer,
                config.raptor.rpm_limit,
                config.raptor.llm_concurrency,
                8192,
            )?;
            let reranker = NoopReranker;

            let mode = match mode.as_str() {
                "traversal" => RetrievalMode::Traversal,
                _ => RetrievalMode::Collapsed,
            };
            let request = RetrievalRequest { dataset_id, query, mode, top_k, expand_k, levels_cap, ..Default::default() };

            let response = retrieve(&db, &embedder, &summarizer, &reranker, request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    db.close().await;
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "raptor_rag=debug,info" } else { "raptor_rag=info,warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

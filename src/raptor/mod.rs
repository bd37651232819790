//! RAPTOR core: chunking, clustering, tree building, query normalization,
//! and retrieval.

pub mod builder;
pub mod chunker;
pub mod clustering;
pub mod query_normalize;
pub mod retrieval;

pub use builder::{build_tree, ingest_chunks_and_embeddings};
pub use chunker::{chunk, ChunkerConfig};
pub use query_normalize::normalize_query;
pub use retrieval::{retrieve, RetrievalMode, RetrievalRequest, RetrievalResponse, RetrievedChunk};

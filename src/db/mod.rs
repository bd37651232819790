//! Database module: relational persistence for documents, chunks, RAPTOR
//! trees, and embeddings, backed by Postgres + pgvector.

mod migrations;
mod models;
mod repository;

pub use migrations::init_schema;
pub use models::{
    Chunk, ChunkDistance, Document, Embedding, NodeChunkLink, NodeDistance, NodeKind, OwnerKind,
    Tree, TreeEdge, TreeNode,
};
pub use repository::{Database, DatabaseError};

//! Relational data model: `Document`, `Chunk`, `Tree`, `TreeNode`,
//! `TreeEdge`, `NodeChunkLink`, `Embedding`.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A source document owning an ordered sequence of chunks.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub dataset_id: String,
    pub source_uri: Option<String>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dataset_id: dataset_id.into(),
            source_uri: None,
            checksum: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// A chunk of a document's text, never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub idx: i32,
    pub text: String,
    pub token_count: Option<i32>,
    pub metadata: Option<Value>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, document_id: impl Into<String>, idx: i32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            idx,
            text: text.into(),
            token_count: None,
            metadata: None,
        }
    }

    pub fn with_token_count(mut self, token_count: i32) -> Self {
        self.token_count = Some(token_count);
        self
    }
}

/// The RAPTOR tree for a single document build, one per document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tree {
    pub id: String,
    pub document_id: String,
    pub dataset_id: String,
    pub params: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Tree {
    pub fn new(id: impl Into<String>, document_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            dataset_id: dataset_id.into(),
            params: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Summary,
    Root,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf => write!(f, "leaf"),
            Self::Summary => write!(f, "summary"),
            Self::Root => write!(f, "root"),
        }
    }
}

/// A node of a RAPTOR tree: a leaf mirrors a chunk, a summary is a
/// synthesized cluster summary, the root is the single top-level node.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TreeNode {
    pub id: String,
    pub tree_id: String,
    pub level: i32,
    pub kind: NodeKind,
    pub text: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn new(id: impl Into<String>, tree_id: impl Into<String>, level: i32, kind: NodeKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tree_id: tree_id.into(),
            level,
            kind,
            text: text.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }
}

/// A parent-to-child edge within a tree; tree-shaped, no cycles.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TreeEdge {
    pub parent_id: String,
    pub child_id: String,
}

/// An ordered, deduplicated link between an internal node (or leaf) and the
/// leaf chunks reachable below it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeChunkLink {
    pub node_id: String,
    pub chunk_id: String,
    pub rank: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OwnerKind {
    Chunk,
    TreeNode,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chunk => write!(f, "chunk"),
            Self::TreeNode => write!(f, "tree_node"),
        }
    }
}

/// An embedding vector owned by exactly one chunk or tree node under a
/// given model.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Embedding {
    pub id: String,
    pub dataset_id: String,
    pub owner_kind: OwnerKind,
    pub owner_id: String,
    pub model: String,
    pub dimension: i32,
    pub vector: Vector,
    pub metadata: Option<Value>,
}

impl Embedding {
    pub fn new(
        id: impl Into<String>,
        dataset_id: impl Into<String>,
        owner_kind: OwnerKind,
        owner_id: impl Into<String>,
        model: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        let dimension = vector.len() as i32;
        Self {
            id: id.into(),
            dataset_id: dataset_id.into(),
            owner_kind,
            owner_id: owner_id.into(),
            model: model.into(),
            dimension,
            vector: Vector::from(vector),
            metadata: None,
        }
    }
}

/// Row shape returned by a cosine-distance nearest-neighbor query, chunk
/// side: the chunk identity plus distance-to-query.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChunkDistance {
    pub chunk_id: String,
    pub document_id: String,
    pub idx: i32,
    pub text: String,
    pub distance: f64,
}

/// Row shape returned by a cosine-distance nearest-neighbor query, node
/// side: a summary/root tree node plus distance-to-query.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeDistance {
    pub node_id: String,
    pub distance: f64,
}

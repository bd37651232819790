//! Database schema.
//!
//! Embedded as a raw SQL string executed at startup, following the
//! teacher's `INIT_SCHEMA`-as-const pattern rather than external migration
//! files. Targets Postgres with the `pgvector` extension for the
//! embeddings ANN index (see `DESIGN.md`, storage backend decision).
//!
//! Constraint names follow the convention required of this schema:
//! `ix_{column_label}`, `uq_{table}_{column}`,
//! `fk_{table}_{column}_{referred_table}`, `pk_{table}`.

/// Render the schema with `embeddings.v` typed to a fixed dimension.
/// pgvector refuses to build an HNSW index on a dimensionless `vector`
/// column, so the dimension configured for this deployment's embedding
/// model is baked into the column type at migration time.
pub fn init_schema(dimension: usize) -> String {
    SCHEMA_TEMPLATE.replace("{dimension}", &dimension.to_string())
}

const SCHEMA_TEMPLATE: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

-- ========================================================================
-- DOCUMENTS AND CHUNKS
-- ========================================================================

CREATE TABLE IF NOT EXISTS documents (
    id TEXT NOT NULL,
    dataset_id TEXT NOT NULL,
    source_uri TEXT,
    checksum TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT pk_documents PRIMARY KEY (id)
);

CREATE INDEX IF NOT EXISTS ix_documents_dataset_id ON documents (dataset_id);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    idx INTEGER NOT NULL,
    text TEXT NOT NULL,
    token_count INTEGER,
    metadata JSONB,
    CONSTRAINT pk_chunks PRIMARY KEY (id),
    CONSTRAINT fk_chunks_document_id_documents FOREIGN KEY (document_id)
        REFERENCES documents (id) ON DELETE CASCADE,
    CONSTRAINT uq_chunks_document_id_idx UNIQUE (document_id, idx)
);

CREATE INDEX IF NOT EXISTS ix_chunks_document_id ON chunks (document_id);

-- ========================================================================
-- RAPTOR TREES
-- ========================================================================

CREATE TABLE IF NOT EXISTS trees (
    id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    dataset_id TEXT NOT NULL,
    params JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT pk_trees PRIMARY KEY (id),
    CONSTRAINT fk_trees_document_id_documents FOREIGN KEY (document_id)
        REFERENCES documents (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS ix_trees_dataset_id ON trees (dataset_id);
CREATE INDEX IF NOT EXISTS ix_trees_document_id ON trees (document_id);

CREATE TABLE IF NOT EXISTS tree_nodes (
    id TEXT NOT NULL,
    tree_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('leaf', 'summary', 'root')),
    text TEXT NOT NULL,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT pk_tree_nodes PRIMARY KEY (id),
    CONSTRAINT fk_tree_nodes_tree_id_trees FOREIGN KEY (tree_id)
        REFERENCES trees (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS ix_tree_nodes_tree_id_level ON tree_nodes (tree_id, level);
CREATE INDEX IF NOT EXISTS ix_tree_nodes_kind ON tree_nodes (kind);

CREATE TABLE IF NOT EXISTS tree_edges (
    parent_id TEXT NOT NULL,
    child_id TEXT NOT NULL,
    CONSTRAINT pk_tree_edges PRIMARY KEY (parent_id, child_id),
    CONSTRAINT fk_tree_edges_parent_id_tree_nodes FOREIGN KEY (parent_id)
        REFERENCES tree_nodes (id) ON DELETE CASCADE,
    CONSTRAINT fk_tree_edges_child_id_tree_nodes FOREIGN KEY (child_id)
        REFERENCES tree_nodes (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS ix_tree_edges_parent_id ON tree_edges (parent_id);
CREATE INDEX IF NOT EXISTS ix_tree_edges_child_id ON tree_edges (child_id);

CREATE TABLE IF NOT EXISTS tree_node_chunks (
    node_id TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT 0,
    CONSTRAINT pk_tree_node_chunks PRIMARY KEY (node_id, chunk_id),
    CONSTRAINT fk_tree_node_chunks_node_id_tree_nodes FOREIGN KEY (node_id)
        REFERENCES tree_nodes (id) ON DELETE CASCADE,
    CONSTRAINT fk_tree_node_chunks_chunk_id_chunks FOREIGN KEY (chunk_id)
        REFERENCES chunks (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS ix_tree_node_chunks_node_id ON tree_node_chunks (node_id);
CREATE INDEX IF NOT EXISTS ix_tree_node_chunks_chunk_id ON tree_node_chunks (chunk_id);

-- ========================================================================
-- EMBEDDINGS
-- ========================================================================

CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT NOT NULL,
    dataset_id TEXT NOT NULL,
    owner_kind TEXT NOT NULL CHECK (owner_kind IN ('chunk', 'tree_node')),
    owner_id TEXT NOT NULL,
    model TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    v vector({dimension}) NOT NULL,
    metadata JSONB,
    CONSTRAINT pk_embeddings PRIMARY KEY (id),
    CONSTRAINT uq_embeddings_owner_kind_owner_id_model UNIQUE (owner_kind, owner_id, model)
);

CREATE INDEX IF NOT EXISTS ix_embeddings_dataset_id_owner_type_owner_id
    ON embeddings (dataset_id, owner_kind, owner_id);

-- Cosine-distance ANN index. HNSW requires pgvector >= 0.5.0; falls back to
-- a plain sequential scan on providers without it (the query still works,
-- just without the index).
CREATE INDEX IF NOT EXISTS ix_embeddings_v_hnsw_cosine
    ON embeddings USING hnsw (v vector_cosine_ops);
"#;

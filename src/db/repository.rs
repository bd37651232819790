//! Postgres-backed persistence for the document/chunk/tree/embedding data
//! model, following the teacher's `Database` wrapper + per-entity CRUD
//! style but targeting `sqlx::PgPool` instead of `SqlitePool`, with an
//! explicit transaction API for the tree builder's per-level atomic
//! commits (see `raptor::builder`).

use super::migrations::init_schema;
use super::models::{Chunk, ChunkDistance, Document, Embedding, NodeDistance, OwnerKind, Tree, TreeEdge, TreeNode};
use crate::config::DatabaseConfig;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Connection pool wrapper. Pool sizing follows spec: 20 base connections,
/// 30 max overflow, 1h recycle, pre-ping enabled (`test_before_acquire`).
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// `embedding_dimension` fixes the `embeddings.v` column's vector
    /// width for this deployment (see `db::migrations::init_schema`).
    pub async fn connect(config: &DatabaseConfig, embedding_dimension: usize) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size + config.pool_max_overflow)
            .min_connections(0)
            .max_lifetime(Duration::from_secs(config.pool_recycle_secs))
            .test_before_acquire(true)
            .connect(&config.dsn)
            .await?;

        let db = Self { pool };
        db.run_migrations(embedding_dimension).await?;
        Ok(db)
    }

    /// Connect against an already-provisioned Postgres instance (used by
    /// `#[sqlx::test]`-style integration tests), skipping pool tuning.
    pub async fn connect_raw(dsn: &str, embedding_dimension: usize) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(dsn).await?;
        let db = Self { pool };
        db.run_migrations(embedding_dimension).await?;
        Ok(db)
    }

    /// Wrap an already-open pool (the fixture handed out by
    /// `#[sqlx::test]`), running migrations against it.
    pub async fn from_pool(pool: PgPool, embedding_dimension: usize) -> Result<Self, DatabaseError> {
        let db = Self { pool };
        db.run_migrations(embedding_dimension).await?;
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self, embedding_dimension: usize) -> Result<(), DatabaseError> {
        sqlx::query(&init_schema(embedding_dimension))
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================================================================
    // Documents / chunks
    // ========================================================================

    pub async fn insert_document(&self, doc: &Document) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO documents (id, dataset_id, source_uri, checksum, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&doc.id)
        .bind(&doc.dataset_id)
        .bind(&doc.source_uri)
        .bind(&doc.checksum)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Document, DatabaseError> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("document {id}")))
    }

    /// Cascades to chunks, trees, tree_nodes, tree_edges, tree_node_chunks
    /// via FK `ON DELETE CASCADE`.
    pub async fn delete_dataset(&self, dataset_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM documents WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM embeddings WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, idx, text, token_count, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.idx)
            .bind(&chunk.text)
            .bind(chunk.token_count)
            .bind(&chunk.metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, DatabaseError> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE document_id = $1 ORDER BY idx ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    // ========================================================================
    // Trees
    // ========================================================================

    pub async fn insert_tree(&self, tree: &Tree) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO trees (id, document_id, dataset_id, params, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&tree.id)
        .bind(&tree.document_id)
        .bind(&tree.dataset_id)
        .bind(&tree.params)
        .bind(tree.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recently built tree for a dataset: ordered by `created_at desc`,
    /// tie-broken by `tree_id` lexicographic descending — the traversal
    /// entry point.
    pub async fn most_recent_tree(&self, dataset_id: &str) -> Result<Option<Tree>, DatabaseError> {
        let tree = sqlx::query_as::<_, Tree>(
            "SELECT * FROM trees WHERE dataset_id = $1
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tree)
    }

    pub async fn get_root_node(&self, tree_id: &str) -> Result<Option<TreeNode>, DatabaseError> {
        let node = sqlx::query_as::<_, TreeNode>(
            "SELECT * FROM tree_nodes WHERE tree_id = $1 AND kind = 'root' LIMIT 1",
        )
        .bind(tree_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(node)
    }

    pub async fn mark_root(&self, node_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE tree_nodes SET kind = 'root' WHERE id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_children(&self, parent_id: &str) -> Result<Vec<TreeNode>, DatabaseError> {
        let nodes = sqlx::query_as::<_, TreeNode>(
            "SELECT n.* FROM tree_nodes n
             JOIN tree_edges e ON e.child_id = n.id
             WHERE e.parent_id = $1
             ORDER BY n.id ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(nodes)
    }

    // ========================================================================
    // Per-level transactional writes for the tree builder
    // ========================================================================

    pub async fn begin_level(&self) -> Result<Transaction<'_, Postgres>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Insert-if-absent, so a retried build with the same deterministic
    /// leaf/summary IDs is safe to re-run.
    pub async fn tx_insert_node(tx: &mut Transaction<'_, Postgres>, node: &TreeNode) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO tree_nodes (id, tree_id, level, kind, text, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&node.id)
        .bind(&node.tree_id)
        .bind(node.level)
        .bind(node.kind)
        .bind(&node.text)
        .bind(&node.metadata)
        .bind(node.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn tx_insert_edge(tx: &mut Transaction<'_, Postgres>, edge: &TreeEdge) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO tree_edges (parent_id, child_id) VALUES ($1, $2)
             ON CONFLICT (parent_id, child_id) DO NOTHING",
        )
        .bind(&edge.parent_id)
        .bind(&edge.child_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn tx_insert_node_chunk_link(
        tx: &mut Transaction<'_, Postgres>,
        node_id: &str,
        chunk_id: &str,
        rank: i32,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO tree_node_chunks (node_id, chunk_id, rank) VALUES ($1, $2, $3)
             ON CONFLICT (node_id, chunk_id) DO UPDATE SET rank = excluded.rank",
        )
        .bind(node_id)
        .bind(chunk_id)
        .bind(rank)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn tx_upsert_embedding(tx: &mut Transaction<'_, Postgres>, embedding: &Embedding) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO embeddings (id, dataset_id, owner_kind, owner_id, model, dimension, v, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (owner_kind, owner_id, model) DO UPDATE SET
                v = excluded.v, dimension = excluded.dimension, metadata = excluded.metadata",
        )
        .bind(&embedding.id)
        .bind(&embedding.dataset_id)
        .bind(embedding.owner_kind)
        .bind(&embedding.owner_id)
        .bind(&embedding.model)
        .bind(embedding.dimension)
        .bind(&embedding.vector)
        .bind(&embedding.metadata)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn upsert_embedding(&self, embedding: &Embedding) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        Self::tx_upsert_embedding(&mut tx, embedding).await?;
        tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Vector search
    // ========================================================================

    /// Nearest summary/root nodes to `query_vector` by cosine distance.
    /// Per the preserved Open Question, this never filters by level.
    pub async fn search_summary_nodes(
        &self,
        dataset_id: &str,
        query_vector: &[f32],
        limit: i64,
    ) -> Result<Vec<NodeDistance>, DatabaseError> {
        let v = Vector::from(query_vector.to_vec());
        let rows = sqlx::query_as::<_, NodeDistance>(
            "SELECT n.id AS node_id, (e.v <=> $1) AS distance
             FROM tree_nodes n
             JOIN trees t ON t.id = n.tree_id
             JOIN embeddings e ON e.owner_kind = 'tree_node' AND e.owner_id = n.id
             WHERE t.dataset_id = $2 AND n.kind IN ('summary', 'root')
             ORDER BY e.v <=> $1
             LIMIT $3",
        )
        .bind(&v)
        .bind(dataset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Leaf chunks reachable from `node_ids` via `tree_node_chunks`, ranked
    /// by cosine distance to `query_vector`.
    pub async fn gather_leaf_chunks(
        &self,
        node_ids: &[String],
        query_vector: &[f32],
        top_k: i64,
    ) -> Result<Vec<ChunkDistance>, DatabaseError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let v = Vector::from(query_vector.to_vec());
        let rows = sqlx::query_as::<_, ChunkDistance>(
            "SELECT DISTINCT c.id AS chunk_id, c.document_id, c.idx, c.text, (e.v <=> $1) AS distance
             FROM tree_node_chunks tnc
             JOIN chunks c ON c.id = tnc.chunk_id
             JOIN embeddings e ON e.owner_kind = 'chunk' AND e.owner_id = c.id
             WHERE tnc.node_id = ANY($2)
             ORDER BY e.v <=> $1
             LIMIT $3",
        )
        .bind(&v)
        .bind(node_ids)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rank an explicit set of tree nodes by cosine distance to
    /// `query_vector`, used by traversal mode to prune each level's
    /// children to the top `per_level_k`.
    pub async fn rank_nodes_by_distance(
        &self,
        node_ids: &[String],
        query_vector: &[f32],
        top_k: i64,
    ) -> Result<Vec<NodeDistance>, DatabaseError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let v = Vector::from(query_vector.to_vec());
        let rows = sqlx::query_as::<_, NodeDistance>(
            "SELECT e.owner_id AS node_id, (e.v <=> $1) AS distance
             FROM embeddings e
             WHERE e.owner_kind = 'tree_node' AND e.owner_id = ANY($2)
             ORDER BY e.v <=> $1
             LIMIT $3",
        )
        .bind(&v)
        .bind(node_ids)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

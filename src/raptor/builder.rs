//! C4 — Tree Builder.
//!
//! Drives the per-level loop: cluster the current layer's vectors,
//! summarize each cluster under a bounded-concurrency semaphore, embed
//! the summaries, then persist the new layer in a single transaction
//! before advancing. Grounded on the teacher's `build_tree_with_progress`
//! in this same module (the old file-walking/cache-bound version, kept as
//! reference during this pass) for the level-by-level shape, generalized
//! to operate over already-chunked, already-embedded input instead of
//! walking a filesystem.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::RaptorConfig;
use crate::db::{Chunk, Database, Document, Embedding, NodeKind, OwnerKind, Tree, TreeEdge, TreeNode};
use crate::error::RaptorError;
use crate::gateways::{EmbeddingGateway, SummarizerGateway};
use crate::ids;
use crate::raptor::clustering;

/// Persist a document's chunks and their leaf embeddings ahead of a tree
/// build. The use case named in the public API between chunking and tree
/// building (`usecases/ingest_and_index_uc.py` in the original source).
pub async fn ingest_chunks_and_embeddings(
    db: &Database,
    document: &Document,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    model: &str,
) -> Result<(), RaptorError> {
    if chunks.len() != vectors.len() {
        return Err(RaptorError::validation(format!(
            "chunk count ({}) does not match vector count ({})",
            chunks.len(),
            vectors.len()
        )));
    }
    if chunks.is_empty() {
        return Err(RaptorError::validation("cannot ingest zero chunks"));
    }

    db.insert_document(document).await?;
    db.insert_chunks(chunks).await?;

    let mut tx = db.begin_level().await?;
    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        let embedding = Embedding::new(
            ids::embedding_id(OwnerKind::Chunk, &chunk.id),
            document.dataset_id.clone(),
            OwnerKind::Chunk,
            chunk.id.clone(),
            model,
            vector.clone(),
        );
        Database::tx_upsert_embedding(&mut tx, &embedding).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Build a RAPTOR tree over `chunks`/`leaf_vectors` and return its id.
pub async fn build_tree(
    db: &Database,
    embedder: &EmbeddingGateway,
    summarizer: &SummarizerGateway,
    document_id: &str,
    dataset_id: &str,
    chunks: &[Chunk],
    leaf_vectors: &[Vec<f32>],
    params: &RaptorConfig,
) -> Result<String, RaptorError> {
    validate_preconditions(document_id, dataset_id, chunks, leaf_vectors)?;

    let tree_id = ids::tree_id(document_id);
    let tree = Tree::new(tree_id.clone(), document_id, dataset_id)
        .with_params(serde_json::to_value(params).unwrap_or(serde_json::Value::Null));
    db.insert_tree(&tree).await?;

    let mut node_chunk_sets: HashMap<String, Vec<String>> = HashMap::new();
    let (mut current_ids, mut current_vectors, mut current_texts) =
        persist_leaf_level(db, &tree_id, dataset_id, chunks, leaf_vectors, &mut node_chunk_sets)
            .await
            .map_err(|e| e.with_context("level", 0).with_context("tree_id", tree_id.clone()))?;

    let min_embed_interval = Duration::from_secs_f64(60.0 / params.rpm_limit.max(1) as f64);
    let mut last_embed: Option<Instant> = None;

    let mut level: usize = 0;
    loop {
        if current_ids.len() <= 1 {
            db.mark_root(&current_ids[0]).await.map_err(RaptorError::from)?;
            return Ok(tree_id);
        }

        let force_single = level + 1 >= params.max_tree_levels;
        let groups = if force_single {
            vec![(0..current_ids.len()).collect::<Vec<usize>>()]
        } else {
            clustering::cluster(&current_vectors, params.min_k, params.max_k)
        };

        let summaries = summarize_clusters(summarizer, &groups, &current_texts, params)
            .await
            .map_err(|e| e.with_context("level", level as i64 + 1).with_context("tree_id", tree_id.clone()))?;

        throttle_embed(&mut last_embed, min_embed_interval).await;
        let vectors = embedder
            .embed_documents(&summaries)
            .await
            .map_err(|e| e.with_context("level", level as i64 + 1).with_context("tree_id", tree_id.clone()))?;

        let new_ids = persist_summary_level(
            db,
            &tree_id,
            dataset_id,
            level,
            &groups,
            &current_ids,
            &summaries,
            &vectors,
            &mut node_chunk_sets,
        )
        .await
        .map_err(|e| e.with_context("level", level as i64 + 1).with_context("tree_id", tree_id.clone()))?;

        current_ids = new_ids;
        current_vectors = vectors;
        current_texts = summaries;
        level += 1;
    }
}

/// Wait out the remainder of `60 / raptor.rpm_limit` seconds since the
/// previous summary-level embed call, mirroring the original source's
/// `_embed_with_throttle`/`_last_embed_ts` build-time throttle (this is
/// separate from the embedding gateway's own request-level limiter, which
/// is keyed on `embedding.rpm_limit` instead).
async fn throttle_embed(last_embed: &mut Option<Instant>, min_interval: Duration) {
    if let Some(last) = *last_embed {
        let elapsed = last.elapsed();
        if elapsed < min_interval {
            tokio::time::sleep(min_interval - elapsed).await;
        }
    }
    *last_embed = Some(Instant::now());
}

fn validate_preconditions(
    document_id: &str,
    dataset_id: &str,
    chunks: &[Chunk],
    leaf_vectors: &[Vec<f32>],
) -> Result<(), RaptorError> {
    if document_id.trim().is_empty() {
        return Err(RaptorError::validation("document_id must not be empty"));
    }
    if dataset_id.trim().is_empty() {
        return Err(RaptorError::validation("dataset_id must not be empty"));
    }
    if chunks.is_empty() {
        return Err(RaptorError::validation("build requires at least one chunk"));
    }
    if chunks.len() != leaf_vectors.len() {
        return Err(RaptorError::validation(format!(
            "chunk count ({}) does not match leaf vector count ({})",
            chunks.len(),
            leaf_vectors.len()
        )));
    }
    let dim = leaf_vectors[0].len();
    if leaf_vectors.iter().any(|v| v.len() != dim) {
        return Err(RaptorError::validation("all leaf vectors must share the same dimension"));
    }
    Ok(())
}

async fn persist_leaf_level(
    db: &Database,
    tree_id: &str,
    dataset_id: &str,
    chunks: &[Chunk],
    leaf_vectors: &[Vec<f32>],
    node_chunk_sets: &mut HashMap<String, Vec<String>>,
) -> Result<(Vec<String>, Vec<Vec<f32>>, Vec<String>), RaptorError> {
    let mut tx = db.begin_level().await?;
    let mut leaf_ids = Vec::with_capacity(chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        let leaf_id = ids::leaf_node_id(tree_id, i);
        let node = TreeNode::new(leaf_id.clone(), tree_id, 0, NodeKind::Leaf, chunk.text.clone());
        Database::tx_insert_node(&mut tx, &node).await?;
        Database::tx_insert_node_chunk_link(&mut tx, &leaf_id, &chunk.id, 0).await?;

        let embedding = Embedding::new(
            ids::embedding_id(OwnerKind::TreeNode, &leaf_id),
            dataset_id,
            OwnerKind::TreeNode,
            leaf_id.clone(),
            "leaf",
            leaf_vectors[i].clone(),
        );
        Database::tx_upsert_embedding(&mut tx, &embedding).await?;

        node_chunk_sets.insert(leaf_id.clone(), vec![chunk.id.clone()]);
        leaf_ids.push(leaf_id);
    }
    tx.commit().await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    Ok((leaf_ids, leaf_vectors.to_vec(), texts))
}

/// Summarize each cluster under a bounded-concurrency semaphore,
/// reassembling results in cluster order regardless of completion order.
async fn summarize_clusters(
    summarizer: &SummarizerGateway,
    groups: &[Vec<usize>],
    current_texts: &[String],
    params: &RaptorConfig,
) -> Result<Vec<String>, RaptorError> {
    let semaphore = Arc::new(Semaphore::new(params.llm_concurrency.max(1)));
    let tasks = groups.iter().enumerate().map(|(idx, group)| {
        let semaphore = semaphore.clone();
        let texts: Vec<String> = group.iter().map(|&i| current_texts[i].clone()).collect();
        let max_tokens = params.max_tokens;
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let summary = summarizer.summarize(&texts, max_tokens).await?;
            Ok::<(usize, String), RaptorError>((idx, summary))
        }
    });

    let mut results = futures::future::try_join_all(tasks).await?;
    results.sort_by_key(|(idx, _)| *idx);
    Ok(results.into_iter().map(|(_, s)| s).collect())
}

#[allow(clippy::too_many_arguments)]
async fn persist_summary_level(
    db: &Database,
    tree_id: &str,
    dataset_id: &str,
    current_level: usize,
    groups: &[Vec<usize>],
    current_ids: &[String],
    summaries: &[String],
    vectors: &[Vec<f32>],
    node_chunk_sets: &mut HashMap<String, Vec<String>>,
) -> Result<Vec<String>, RaptorError> {
    let new_level = current_level as i32 + 1;
    let mut tx = db.begin_level().await?;
    let mut new_ids = Vec::with_capacity(groups.len());
    let mut new_leaf_sets: Vec<(String, Vec<String>)> = Vec::with_capacity(groups.len());

    for (j, group) in groups.iter().enumerate() {
        let new_node_id = ids::summary_node_id(tree_id, new_level as usize, j);
        let node = TreeNode::new(new_node_id.clone(), tree_id, new_level, NodeKind::Summary, summaries[j].clone());
        Database::tx_insert_node(&mut tx, &node).await?;

        let mut leaf_chunk_ids: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for &m in group {
            let child_id = &current_ids[m];
            Database::tx_insert_edge(
                &mut tx,
                &TreeEdge { parent_id: new_node_id.clone(), child_id: child_id.clone() },
            )
            .await?;
            if let Some(child_chunks) = node_chunk_sets.get(child_id) {
                for chunk_id in child_chunks {
                    if seen.insert(chunk_id.clone()) {
                        leaf_chunk_ids.push(chunk_id.clone());
                    }
                }
            }
        }

        for (rank, chunk_id) in leaf_chunk_ids.iter().enumerate() {
            Database::tx_insert_node_chunk_link(&mut tx, &new_node_id, chunk_id, rank as i32).await?;
        }

        let embedding = Embedding::new(
            ids::embedding_id(OwnerKind::TreeNode, &new_node_id),
            dataset_id,
            OwnerKind::TreeNode,
            new_node_id.clone(),
            "summary",
            vectors[j].clone(),
        );
        Database::tx_upsert_embedding(&mut tx, &embedding).await?;

        new_leaf_sets.push((new_node_id.clone(), leaf_chunk_ids));
        new_ids.push(new_node_id);
    }
    tx.commit().await?;

    for (id, set) in new_leaf_sets {
        node_chunk_sets.insert(id, set);
    }
    Ok(new_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_chunk_and_vector_counts() {
        let chunks = vec![Chunk::new("c1", "doc-1", 0, "hello")];
        let vectors: Vec<Vec<f32>> = vec![];
        let err = validate_preconditions("doc-1", "ds-1", &chunks, &vectors).unwrap_err();
        assert_eq!(err.error_code(), "validation");
    }

    #[test]
    fn rejects_empty_document_id() {
        let chunks = vec![Chunk::new("c1", "doc-1", 0, "hello")];
        let vectors = vec![vec![0.0; 4]];
        let err = validate_preconditions("", "ds-1", &chunks, &vectors).unwrap_err();
        assert_eq!(err.error_code(), "validation");
    }

    #[test]
    fn rejects_ragged_vector_dimensions() {
        let chunks = vec![
            Chunk::new("c1", "doc-1", 0, "hello"),
            Chunk::new("c2", "doc-1", 1, "world"),
        ];
        let vectors = vec![vec![0.0; 4], vec![0.0; 3]];
        let err = validate_preconditions("doc-1", "ds-1", &chunks, &vectors).unwrap_err();
        assert_eq!(err.error_code(), "validation");
    }

    #[test]
    fn accepts_well_formed_input() {
        let chunks = vec![Chunk::new("c1", "doc-1", 0, "hello")];
        let vectors = vec![vec![0.0; 4]];
        assert!(validate_preconditions("doc-1", "ds-1", &chunks, &vectors).is_ok());
    }

    #[tokio::test]
    async fn throttle_embed_waits_out_the_minimum_interval() {
        let min_interval = Duration::from_millis(50);
        let mut last_embed = None;
        let start = std::time::Instant::now();
        throttle_embed(&mut last_embed, min_interval).await;
        assert!(start.elapsed() < min_interval, "first call must not wait");

        throttle_embed(&mut last_embed, min_interval).await;
        assert!(start.elapsed() >= min_interval, "second call must wait out the remaining interval");
    }
}

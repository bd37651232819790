//! C5 — Retrieval Engine.
//!
//! Translates a natural-language query into ranked leaf chunks via either
//! collapsed-tree search (rank summary/root nodes directly, then expand to
//! leaves) or traversal search (descend from the most recent root,
//! pruning children level by level). Grounded on
//! `services/retrieval/retrieval_service.py`'s `collapsed`/`traversal`
//! dispatch and its `_ms_since` per-span timing pattern, expressed here as
//! `tracing` spans.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::RaptorError;
use crate::gateways::{EmbeddingGateway, Reranker, SummarizerGateway};
use crate::raptor::query_normalize::normalize_query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Collapsed,
    Traversal,
}

impl Default for RetrievalMode {
    fn default() -> Self {
        Self::Collapsed
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub dataset_id: String,
    pub query: String,
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub expand_k: usize,
    pub levels_cap: usize,
    pub use_reranker: bool,
    pub reranker_model: Option<String>,
}

impl Default for RetrievalRequest {
    fn default() -> Self {
        Self {
            dataset_id: String::new(),
            query: String::new(),
            mode: RetrievalMode::default(),
            top_k: 8,
            expand_k: 5,
            levels_cap: 0,
            use_reranker: false,
            reranker_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub index: i32,
    pub text: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub status: u16,
    pub chunks: Vec<RetrievedChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Never fails: any internal error is translated into a `{status: 500,
/// error}` response, per spec's never-silently-degrade policy (the error
/// is surfaced, not swallowed into an empty result).
pub async fn retrieve(
    db: &Database,
    embedder: &EmbeddingGateway,
    summarizer: &SummarizerGateway,
    reranker: &dyn Reranker,
    request: RetrievalRequest,
) -> RetrievalResponse {
    match retrieve_inner(db, embedder, summarizer, reranker, &request).await {
        Ok(chunks) => RetrievalResponse { status: 200, chunks, error: None },
        Err(err) => {
            tracing::warn!(error = %err, dataset_id = %request.dataset_id, "retrieval failed");
            RetrievalResponse { status: err.status_code(), chunks: Vec::new(), error: Some(err.to_string()) }
        }
    }
}

async fn retrieve_inner(
    db: &Database,
    embedder: &EmbeddingGateway,
    summarizer: &SummarizerGateway,
    reranker: &dyn Reranker,
    request: &RetrievalRequest,
) -> Result<Vec<RetrievedChunk>, RaptorError> {
    if request.dataset_id.trim().is_empty() {
        return Err(RaptorError::validation("dataset_id must not be empty"));
    }
    if !(1..=200).contains(&request.top_k) {
        return Err(RaptorError::validation("top_k must be between 1 and 200"));
    }

    let rewrite_start = Instant::now();
    let normalized = normalize_query(summarizer, &request.query).await?;
    tracing::debug!(elapsed_ms = rewrite_start.elapsed().as_millis() as u64, "query normalized");

    let embed_start = Instant::now();
    let query_vector = embedder.embed_query(&normalized).await?;
    tracing::debug!(elapsed_ms = embed_start.elapsed().as_millis() as u64, "query embedded");
    if query_vector.len() != embedder.dimension() {
        return Err(RaptorError::validation(format!(
            "query embedding has dimension {}, expected {}",
            query_vector.len(),
            embedder.dimension()
        )));
    }

    let search_start = Instant::now();
    let mut chunks = match request.mode {
        RetrievalMode::Collapsed => search_collapsed(db, request, &query_vector).await?,
        RetrievalMode::Traversal => search_traversal(db, request, &query_vector).await?,
    };
    tracing::debug!(
        elapsed_ms = search_start.elapsed().as_millis() as u64,
        mode = ?request.mode,
        found = chunks.len(),
        "tree search complete"
    );

    if request.use_reranker {
        let rerank_start = Instant::now();
        chunks = apply_reranker(reranker, &normalized, chunks).await?;
        tracing::debug!(elapsed_ms = rerank_start.elapsed().as_millis() as u64, "reranking complete");
    }

    Ok(chunks)
}

async fn search_collapsed(
    db: &Database,
    request: &RetrievalRequest,
    query_vector: &[f32],
) -> Result<Vec<RetrievedChunk>, RaptorError> {
    let nodes = db.search_summary_nodes(&request.dataset_id, query_vector, request.expand_k as i64).await?;
    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    let node_ids: Vec<String> = nodes.into_iter().map(|n| n.node_id).collect();
    let rows = db.gather_leaf_chunks(&node_ids, query_vector, request.top_k as i64).await?;
    Ok(rows
        .into_iter()
        .map(|r| RetrievedChunk { chunk_id: r.chunk_id, doc_id: r.document_id, index: r.idx, text: r.text, distance: r.distance })
        .collect())
}

async fn search_traversal(
    db: &Database,
    request: &RetrievalRequest,
    query_vector: &[f32],
) -> Result<Vec<RetrievedChunk>, RaptorError> {
    let tree = match db.most_recent_tree(&request.dataset_id).await? {
        Some(tree) => tree,
        None => return Ok(Vec::new()),
    };
    let root = match db.get_root_node(&tree.id).await? {
        Some(root) => root,
        None => return Ok(Vec::new()),
    };

    let mut frontier = vec![root.id];
    let mut level = 0usize;
    loop {
        if request.levels_cap > 0 && level >= request.levels_cap {
            break;
        }

        let mut candidate_ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for parent in &frontier {
            for child in db.get_children(parent).await? {
                if seen.insert(child.id.clone()) {
                    candidate_ids.push(child.id);
                }
            }
        }
        if candidate_ids.is_empty() {
            break;
        }

        let ranked = db.rank_nodes_by_distance(&candidate_ids, query_vector, request.top_k as i64).await?;
        frontier = ranked.into_iter().map(|n| n.node_id).collect();
        level += 1;
    }

    let rows = db.gather_leaf_chunks(&frontier, query_vector, request.top_k as i64).await?;
    Ok(rows
        .into_iter()
        .map(|r| RetrievedChunk { chunk_id: r.chunk_id, doc_id: r.document_id, index: r.idx, text: r.text, distance: r.distance })
        .collect())
}

/// Replaces the ordering by the reranker's scores (higher is better) while
/// leaving each chunk's cosine distance untouched, preserving the
/// distance-in-[0,2] contract for whatever order the reranker settles on.
async fn apply_reranker(
    reranker: &dyn Reranker,
    query: &str,
    chunks: Vec<RetrievedChunk>,
) -> Result<Vec<RetrievedChunk>, RaptorError> {
    let pairs: Vec<(String, String)> = chunks.iter().map(|c| (c.chunk_id.clone(), c.text.clone())).collect();
    let scored = reranker.rerank(query, pairs).await?;
    let mut by_id: std::collections::HashMap<String, RetrievedChunk> =
        chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();

    let mut ordered: Vec<(f32, RetrievedChunk)> = scored
        .into_iter()
        .filter_map(|(id, score)| by_id.remove(&id).map(|c| (score, c)))
        .collect();
    ordered.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ordered.into_iter().map(|(_, c)| c).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_uses_collapsed_mode() {
        let request = RetrievalRequest::default();
        assert_eq!(request.mode, RetrievalMode::Collapsed);
        assert_eq!(request.top_k, 8);
        assert_eq!(request.expand_k, 5);
    }
}

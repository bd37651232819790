//! Optional reranking hook for the retrieval engine.
//!
//! Mirrors the retrieval service's `self.reranker.rerank(chunks, model, q)`
//! call: when a reranker model is requested, pairs are scored and
//! reordered; absent a model, retrieval falls back to distance order
//! unchanged. No production reranker model is wired up here — this is the
//! seam the retrieval engine calls through, matching spec's "optional
//! capability" framing.

use crate::error::RaptorError;

#[async_trait::async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<(String, String)>) -> Result<Vec<(String, f32)>, RaptorError>;
}

/// Default reranker: passes candidates through unscored, preserving
/// incoming order. Used when no `reranker_model` is specified on a query.
pub struct NoopReranker;

#[async_trait::async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &str, candidates: Vec<(String, String)>) -> Result<Vec<(String, f32)>, RaptorError> {
        Ok(candidates.into_iter().map(|(id, _text)| (id, 0.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_reranker_preserves_order() {
        let reranker = NoopReranker;
        let candidates = vec![("a".to_string(), "text a".to_string()), ("b".to_string(), "text b".to_string())];
        let result = reranker.rerank("query", candidates).await.unwrap();
        assert_eq!(result[0].0, "a");
        assert_eq!(result[1].0, "b");
    }
}

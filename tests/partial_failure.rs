//! A summarizer failure at the second tree level must leave the first
//! level fully persisted and queryable, and must surface with
//! `{level, tree_id}` context rather than silently dropping the build.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use raptor_rag::config::{EmbeddingConfig, RaptorConfig, SummarizerConfig};
use raptor_rag::db::{Chunk, Database, Document};
use raptor_rag::gateways::{EmbeddingGateway, NoopReranker, SummarizerGateway};
use raptor_rag::raptor::{build_tree, ingest_chunks_and_embeddings, retrieve, RetrievalRequest};
use serde_json::json;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn leaf_embedding(bucket: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; 4];
    v[bucket] = 1.0;
    v
}

#[sqlx::test]
async fn summarizer_failure_at_level_two_preserves_level_one(pool: PgPool) -> sqlx::Result<()> {
    let db = Database::from_pool(pool, 4).await.expect("migrations apply");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let count = body["input"].as_array().unwrap().len();
            let data: Vec<_> = (0..count).map(|i| json!({ "embedding": leaf_embedding(i % 4) })).collect();
            ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
        })
        .mount(&server)
        .await;

    // The first two chat-completion calls summarize the two first-level
    // clusters and succeed; the third call, building the second level,
    // fails with a transient 500 that exhausts the retry budget (wiremock
    // returns 500 every time, so `with_retry` burns its 5 attempts and
    // the build surfaces a summarization error for level 2).
    let calls = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |_req: &wiremock::Request| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{ "message": { "content": format!("summary of cluster {n}") } }]
                }))
            } else {
                ResponseTemplate::new(500).set_body_string("synthetic provider outage")
            }
        })
        .mount(&server)
        .await;

    let embedding_config = EmbeddingConfig { base_url: server.uri(), dimension: 4, rpm_limit: 6000, concurrency: 4, ..Default::default() };
    let summarizer_config = SummarizerConfig { base_url: server.uri(), ..Default::default() };
    let embedder = EmbeddingGateway::new(&embedding_config).expect("default model is supported");
    let summarizer = SummarizerGateway::new(&summarizer_config, 6000, 4, 8192).expect("default model is supported");

    let chunks: Vec<Chunk> = (0..4)
        .map(|i| Chunk::new(format!("doc-3::chunk::{i:06}"), "doc-3", i, format!("leaf text number {i}")))
        .collect();
    let leaf_vectors: Vec<Vec<f32>> = (0..4).map(leaf_embedding).collect();

    let document = Document::new("doc-3", "dataset-3");
    ingest_chunks_and_embeddings(&db, &document, &chunks, &leaf_vectors, "text-embedding-3").await.expect("ingest succeeds");

    // Force exactly two clusters at level 1, then a forced single cluster
    // at level 2 (max_tree_levels=2 means level+1 >= 2 once level==1).
    let params = RaptorConfig { min_k: 2, max_k: 2, max_tree_levels: 2, ..Default::default() };
    let err = build_tree(&db, &embedder, &summarizer, "doc-3", "dataset-3", &chunks, &leaf_vectors, &params)
        .await
        .expect_err("level 2 summarization must fail");

    assert_eq!(err.error_code(), "summarization");
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.context().get("level").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(err.context().get("tree_id").and_then(|v| v.as_str()), Some("doc-3::tree"));

    // Level 1's two summary nodes must still be there and retrievable,
    // even though the build as a whole never reached a root.
    let reranker = NoopReranker;
    let request = RetrievalRequest { dataset_id: "dataset-3".to_string(), query: "leaf text number 1".to_string(), top_k: 4, ..Default::default() };
    let response = retrieve(&db, &embedder, &summarizer, &reranker, request).await;
    assert_eq!(response.status, 200);
    assert!(!response.chunks.is_empty(), "level-1 summary nodes should still route to leaf chunks");

    db.close().await;
    Ok(())
}

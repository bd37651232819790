//! End-to-end coverage over a real Postgres instance: chunk a short
//! document, build its RAPTOR tree against a mocked embedding/summarizer
//! backend, then retrieve against it in both collapsed and traversal mode.

use raptor_rag::config::{EmbeddingConfig, RaptorConfig, SummarizerConfig};
use raptor_rag::db::{Chunk, Database, Document};
use raptor_rag::gateways::{EmbeddingGateway, NoopReranker, SummarizerGateway};
use raptor_rag::raptor::{build_tree, chunk, ingest_chunks_and_embeddings, retrieve, ChunkerConfig, RetrievalMode, RetrievalRequest};
use serde_json::json;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCUMENT: &str = "\
Raptors are a diverse group of birds of prey. They are found on every \
continent except Antarctica. Eagles, hawks, and falcons are the most \
well known raptors.

Bats are the only mammals capable of true, sustained flight. Unlike birds, \
their wings are formed by a thin membrane stretched across elongated \
finger bones. Most bat species are nocturnal.

The deep ocean hosts ecosystems that never see sunlight. Hydrothermal \
vents support bacteria that convert chemical energy into food through \
chemosynthesis. Tube worms and blind crabs cluster around these vents.";

fn embedding_for(text: &str) -> Vec<f32> {
    // Deterministic pseudo-embedding: a handful of keyword buckets so
    // cosine distance meaningfully separates the three topics above.
    let lower = text.to_lowercase();
    let mut v = vec![0.0f32; 8];
    v[0] = if lower.contains("raptor") || lower.contains("eagle") || lower.contains("hawk") { 1.0 } else { 0.0 };
    v[1] = if lower.contains("bat") || lower.contains("mammal") || lower.contains("wing") { 1.0 } else { 0.0 };
    v[2] = if lower.contains("ocean") || lower.contains("vent") || lower.contains("worm") { 1.0 } else { 0.0 };
    v[3] = 0.1;
    v
}

async fn mock_backends() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let inputs = body["input"].as_array().unwrap();
            let data: Vec<_> = inputs
                .iter()
                .map(|t| json!({ "embedding": embedding_for(t.as_str().unwrap()) }))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let content = body["messages"][0]["content"].as_str().unwrap_or("").to_lowercase();
            let mut summary = String::from("a synthesized summary covering");
            if content.contains("raptor") || content.contains("eagle") || content.contains("hawk") {
                summary.push_str(" raptors eagles hawks");
            }
            if content.contains("bat") || content.contains("mammal") || content.contains("wing") {
                summary.push_str(" bats mammals wings");
            }
            if content.contains("ocean") || content.contains("vent") || content.contains("worm") {
                summary.push_str(" ocean vents worms");
            }
            ResponseTemplate::new(200).set_body_json(json!({ "choices": [{ "message": { "content": summary } }] }))
        })
        .mount(&server)
        .await;

    server
}

fn gateways(base_url: &str) -> (EmbeddingGateway, SummarizerGateway) {
    let embedding_config = EmbeddingConfig { base_url: base_url.to_string(), dimension: 8, rpm_limit: 6000, concurrency: 4, ..Default::default() };
    let summarizer_config = SummarizerConfig { base_url: base_url.to_string(), ..Default::default() };
    (
        EmbeddingGateway::new(&embedding_config).expect("default model is supported"),
        SummarizerGateway::new(&summarizer_config, 6000, 4, 8192).expect("default model is supported"),
    )
}

#[sqlx::test]
async fn chunk_build_and_collapsed_retrieve_round_trip(pool: PgPool) -> sqlx::Result<()> {
    let db = Database::from_pool(pool, 8).await.expect("migrations apply");
    let server = mock_backends().await;
    let (embedder, summarizer) = gateways(&server.uri());

    let chunker_config = ChunkerConfig::new(220, 0, false, None);
    let texts = chunk(DOCUMENT, &chunker_config);
    assert_eq!(texts.len(), 3, "one chunk per paragraph at this chunk_size/overlap");

    let chunks: Vec<Chunk> =
        texts.iter().enumerate().map(|(i, t)| Chunk::new(format!("doc-1::chunk::{i:06}"), "doc-1", i as i32, t.clone())).collect();
    let leaf_vectors: Vec<Vec<f32>> = chunks.iter().map(|c| embedding_for(&c.text)).collect();

    let document = Document::new("doc-1", "dataset-1");
    ingest_chunks_and_embeddings(&db, &document, &chunks, &leaf_vectors, "text-embedding-3").await.expect("ingest succeeds");

    let params = RaptorConfig { min_k: 2, max_k: 3, rpm_limit: 6000, ..Default::default() };
    let tree_id = build_tree(&db, &embedder, &summarizer, "doc-1", "dataset-1", &chunks, &leaf_vectors, &params)
        .await
        .expect("tree build succeeds");
    assert!(tree_id.starts_with("doc-1"));

    let reranker = NoopReranker;
    let request = RetrievalRequest {
        dataset_id: "dataset-1".to_string(),
        query: "Tell me about bats and other flying mammals.".to_string(),
        top_k: 1,
        ..Default::default()
    };
    let response = retrieve(&db, &embedder, &summarizer, &reranker, request).await;

    assert_eq!(response.status, 200);
    assert!(response.error.is_none());
    assert_eq!(response.chunks.len(), 1);
    assert!(response.chunks[0].text.to_lowercase().contains("bat"));
    assert!((0.0..=2.0).contains(&response.chunks[0].distance));

    db.close().await;
    Ok(())
}

#[sqlx::test]
async fn traversal_and_collapsed_modes_agree_on_a_shallow_tree(pool: PgPool) -> sqlx::Result<()> {
    let db = Database::from_pool(pool, 8).await.expect("migrations apply");
    let server = mock_backends().await;
    let (embedder, summarizer) = gateways(&server.uri());

    let chunker_config = ChunkerConfig::new(220, 0, false, None);
    let texts = chunk(DOCUMENT, &chunker_config);
    let chunks: Vec<Chunk> =
        texts.iter().enumerate().map(|(i, t)| Chunk::new(format!("doc-2::chunk::{i:06}"), "doc-2", i as i32, t.clone())).collect();
    let leaf_vectors: Vec<Vec<f32>> = chunks.iter().map(|c| embedding_for(&c.text)).collect();

    let document = Document::new("doc-2", "dataset-2");
    ingest_chunks_and_embeddings(&db, &document, &chunks, &leaf_vectors, "text-embedding-3").await.expect("ingest succeeds");

    let params = RaptorConfig { min_k: 2, max_k: 3, max_tree_levels: 2, rpm_limit: 6000, ..Default::default() };
    build_tree(&db, &embedder, &summarizer, "doc-2", "dataset-2", &chunks, &leaf_vectors, &params)
        .await
        .expect("tree build succeeds");

    let reranker = NoopReranker;
    let base_request = RetrievalRequest { dataset_id: "dataset-2".to_string(), query: "deep sea vents".to_string(), top_k: 1, levels_cap: 1, ..Default::default() };

    let collapsed = retrieve(&db, &embedder, &summarizer, &reranker, RetrievalRequest { mode: RetrievalMode::Collapsed, ..base_request.clone() }).await;
    let traversal = retrieve(&db, &embedder, &summarizer, &reranker, RetrievalRequest { mode: RetrievalMode::Traversal, ..base_request }).await;

    assert_eq!(collapsed.status, 200);
    assert_eq!(traversal.status, 200);
    assert_eq!(collapsed.chunks.first().map(|c| &c.chunk_id), traversal.chunks.first().map(|c| &c.chunk_id));

    db.close().await;
    Ok(())
}

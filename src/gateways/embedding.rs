//! C2 — Embedding Gateway.
//!
//! Batches text into an embeddings API call, preserving input order and
//! failing all-or-nothing, grounded structurally on the teacher's
//! `EmbeddingEngine` (`embedding/mod.rs`, now removed: its local fastembed
//! inference is replaced here by a remote HTTP call shaped like
//! `OpenAIProvider` in `agent/provider.rs`) plus the rate-limit/retry layer
//! in `gateways::http`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::RaptorError;
use crate::gateways::http::{classify_status, parse_retry_after, with_retry, Classification, RateLimiter, RequestOutcome};
use crate::gateways::registry::resolve_provider;

/// Batch size used per outbound request; within the 64-128 typical range.
const BATCH_SIZE: usize = 96;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct EmbeddingGateway {
    client: Client,
    model: String,
    dimension: usize,
    base_url: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl EmbeddingGateway {
    /// Fails with `model_not_supported` before any client is built if
    /// `config.model` is not in the provider route table.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RaptorError> {
        resolve_provider(&config.model)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds");
        Ok(Self {
            client,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config.base_url.clone(),
            api_key: config.resolve_api_key(),
            limiter: RateLimiter::new(config.rpm_limit, config.concurrency),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a batch of documents, returning vectors in the same order as
    /// `texts`. Fails the whole call if any batch fails or any vector is
    /// non-finite.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RaptorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let vectors = self.embed_batch(batch).await?;
            out.extend(vectors);
        }
        ensure_finite(&out)?;
        Ok(out)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RaptorError> {
        let batch = [text.to_string()];
        let mut vectors = self.embed_batch(&batch).await?;
        ensure_finite(&vectors)?;
        vectors
            .pop()
            .ok_or_else(|| RaptorError::embedding("embedding provider returned no vectors"))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RaptorError> {
        let _permit = self.limiter.acquire().await;

        with_retry(|| async {
            let mut request = self
                .client
                .post(format!("{}/v1/embeddings", self.base_url))
                .json(&EmbeddingRequest { model: &self.model, input: batch });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    return Err(RequestOutcome::Transient {
                        err: RaptorError::embedding(format!("transport error: {e}")),
                        retry_after: None,
                    })
                }
            };

            let status = response.status();
            if !status.is_success() {
                let retry_after = parse_retry_after(
                    response.headers().get("retry-after").and_then(|v| v.to_str().ok()),
                );
                let body = response.text().await.unwrap_or_default();
                let err = RaptorError::embedding(format!("embedding provider error {status}: {body}"));
                return match classify_status(status) {
                    Classification::Permanent => Err(RequestOutcome::Permanent(err)),
                    Classification::Transient => Err(RequestOutcome::Transient { err, retry_after }),
                };
            }

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| RequestOutcome::Permanent(RaptorError::embedding(format!("invalid response body: {e}"))))?;

            Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
        })
        .await
    }
}

fn ensure_finite(vectors: &[Vec<f32>]) -> Result<(), RaptorError> {
    for (i, v) in vectors.iter().enumerate() {
        if v.iter().any(|x| !x.is_finite()) {
            return Err(RaptorError::embedding(format!("non-finite value in embedding at index {i}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_model_rejected_at_construction() {
        let config = EmbeddingConfig { model: "not-a-real-model".to_string(), ..EmbeddingConfig::default() };
        let err = EmbeddingGateway::new(&config).unwrap_err();
        assert_eq!(err.error_code(), "model_not_supported");
    }

    #[test]
    fn finite_check_rejects_nan() {
        let vectors = vec![vec![1.0, f32::NAN, 2.0]];
        assert!(ensure_finite(&vectors).is_err());
    }

    #[test]
    fn finite_check_rejects_inf() {
        let vectors = vec![vec![1.0, f32::INFINITY]];
        assert!(ensure_finite(&vectors).is_err());
    }

    #[test]
    fn finite_check_accepts_normal_values() {
        let vectors = vec![vec![1.0, -2.5, 0.0]];
        assert!(ensure_finite(&vectors).is_ok());
    }
}

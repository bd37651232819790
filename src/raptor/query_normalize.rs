//! Query normalization: the token-threshold rewrite rule from retrieval's
//! query-rewrite step, split out as its own addressable unit so it is
//! testable in isolation — grounded on
//! `services/retrieval/query_rewrite_service.py`'s `normalize_query` in the
//! original source.

use crate::error::RaptorError;
use crate::gateways::SummarizerGateway;

const SOFT_THRESHOLD: usize = 60;
const HARD_THRESHOLD: usize = 300;
const TARGET_TOKENS: usize = 40;

/// Normalize `query` against `soft`/`hard`/`target` token thresholds:
/// under `soft`, pass through unchanged; between `soft` and `hard`,
/// rewrite via the summarizer into a concise form of about `target`
/// tokens; above `hard`, fail with `query-too-long` before any network
/// call is made.
pub async fn normalize_query(summarizer: &SummarizerGateway, query: &str) -> Result<String, RaptorError> {
    if query.trim().is_empty() {
        return Err(RaptorError::validation("query must not be empty"));
    }

    let token_count = summarizer.count_tokens(query);
    if token_count > HARD_THRESHOLD {
        return Err(RaptorError::query_too_long(format!(
            "query has {token_count} tokens, exceeding the hard threshold of {HARD_THRESHOLD}"
        )));
    }
    if token_count <= SOFT_THRESHOLD {
        return Ok(query.to_string());
    }

    summarizer.rewrite_query(query, TARGET_TOKENS).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummarizerConfig;

    fn summarizer() -> SummarizerGateway {
        let config = SummarizerConfig {
            default_model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            api_key: None,
            base_url: "http://localhost".to_string(),
        };
        SummarizerGateway::new(&config, 600, 2, 8192).expect("valid summarizer config")
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let gw = summarizer();
        let err = normalize_query(&gw, "   ").await.unwrap_err();
        assert_eq!(err.error_code(), "validation");
    }

    #[tokio::test]
    async fn short_query_passes_through_unchanged() {
        let gw = summarizer();
        let query = "what is the capital of France";
        let result = normalize_query(&gw, query).await.unwrap();
        assert_eq!(result, query);
    }

    #[tokio::test]
    async fn query_over_hard_threshold_fails_without_network_call() {
        let gw = summarizer();
        let huge = "word ".repeat(400);
        let err = normalize_query(&gw, &huge).await.unwrap_err();
        assert_eq!(err.error_code(), "query_too_long");
    }
}

//! C3 — Summarizer Gateway.
//!
//! Collapses a group of texts into one summary, or rewrites an
//! over-length query into a concise search form, via a chat-completions
//! style call. Enforces the model's context window locally (so an
//! over-budget prompt never reaches the network) before dispatching
//! through the same rate-limit/retry machinery as the embedding gateway.
//! Grounded on the teacher's `OpenAIProvider::chat` in `agent/provider.rs`
//! for the request/response shape.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

use crate::config::SummarizerConfig;
use crate::error::RaptorError;
use crate::gateways::http::{classify_status, parse_retry_after, with_retry, Classification, RateLimiter, RequestOutcome};
use crate::gateways::registry::resolve_provider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Tokens reserved for the response and message-framing overhead; a prompt
/// within `context_window - SAFETY_MARGIN` tokens is allowed through.
const SAFETY_MARGIN: usize = 768;

const SUMMARY_PROMPT_PREFIX: &str = "Summarize the following passages into a single coherent paragraph that preserves the key facts. Use only information present in the input, omit any reasoning steps, and write \"unknown\" for facts you cannot determine:\n\n";
const REWRITE_PROMPT_PREFIX: &str = "Rewrite the following search query into a concise, self-contained query of about 40 tokens, preserving its original language and intent:\n\n";

pub struct SummarizerGateway {
    client: Client,
    model: String,
    temperature: f32,
    base_url: String,
    api_key: Option<String>,
    context_window: usize,
    limiter: RateLimiter,
    tokenizer: CoreBPE,
}

impl std::fmt::Debug for SummarizerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerGateway")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("context_window", &self.context_window)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl SummarizerGateway {
    /// Fails with `model_not_supported` before any client or tokenizer is
    /// built if `config.default_model` is not in the provider route table.
    pub fn new(config: &SummarizerConfig, rpm_limit: u32, concurrency: usize, context_window: usize) -> Result<Self, RaptorError> {
        resolve_provider(&config.default_model)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds");
        let tokenizer = get_bpe_from_model(&config.default_model)
            .or_else(|_| get_bpe_from_model("gpt-4"))
            .expect("a fallback tokenizer is always available");
        Ok(Self {
            client,
            model: config.default_model.clone(),
            temperature: config.temperature,
            base_url: config.base_url.clone(),
            api_key: config.resolve_api_key(),
            context_window,
            limiter: RateLimiter::new(rpm_limit, concurrency),
            tokenizer,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_with_special_tokens(text).len()
    }

    /// Summarize `texts` into one paragraph bounded by `max_tokens`.
    /// Rejects locally, without any network call, if the assembled prompt
    /// would not fit the model's context window minus the safety margin.
    pub async fn summarize(&self, texts: &[String], max_tokens: usize) -> Result<String, RaptorError> {
        if texts.is_empty() {
            return Err(RaptorError::validation("summarize requires at least one text"));
        }
        let prompt = format!("{SUMMARY_PROMPT_PREFIX}{}", texts.join("\n\n---\n\n"));
        self.chat_completion(&prompt, max_tokens).await
    }

    /// Rewrite `query` into a concise search form bounded by `target_tokens`.
    pub async fn rewrite_query(&self, query: &str, target_tokens: usize) -> Result<String, RaptorError> {
        let prompt = format!("{REWRITE_PROMPT_PREFIX}{query}");
        self.chat_completion(&prompt, target_tokens).await
    }

    async fn chat_completion(&self, prompt: &str, max_tokens: usize) -> Result<String, RaptorError> {
        self.check_context_budget(prompt, max_tokens)?;

        let _permit = self.limiter.acquire().await;
        with_retry(|| async {
            let mut request = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .json(&ChatRequest {
                    model: &self.model,
                    temperature: self.temperature,
                    max_tokens,
                    messages: vec![ChatMessage { role: "user", content: prompt }],
                });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    return Err(RequestOutcome::Transient {
                        err: RaptorError::summarization(format!("transport error: {e}")),
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
                let err = RaptorError::summarization(format!("summarizer provider error {status}: {body}"));
                return match classify_status(status) {
                    Classification::Permanent => Err(RequestOutcome::Permanent(err)),
                    Classification::Transient => Err(RequestOutcome::Transient { err, retry_after }),
                };
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| RequestOutcome::Permanent(RaptorError::summarization(format!("invalid response body: {e}"))))?;

            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| RequestOutcome::Permanent(RaptorError::summarization("summarizer returned no choices")))
        })
        .await
    }

    fn check_context_budget(&self, prompt: &str, max_tokens: usize) -> Result<(), RaptorError> {
        let prompt_tokens = self.count_tokens(prompt);
        let budget = self.context_window.saturating_sub(SAFETY_MARGIN);
        if prompt_tokens + max_tokens > budget {
            return Err(RaptorError::context_limit_exceeded(format!(
                "prompt requires {prompt_tokens} tokens plus {max_tokens} reserved for completion, exceeding the {budget}-token budget"
            )));
        }
        Ok(())
    }
}

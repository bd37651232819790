//! Outbound provider gateways: rate-limited, retrying HTTP clients for
//! embeddings and summarization, plus the shared provider registry and
//! an optional reranking hook.

pub mod embedding;
pub mod http;
pub mod registry;
pub mod reranker;
pub mod summarizer;

pub use embedding::EmbeddingGateway;
pub use registry::{normalize_model_name, resolve_provider, Provider};
pub use reranker::{NoopReranker, Reranker};
pub use summarizer::SummarizerGateway;

//! Structured error taxonomy shared across the chunker, gateways, tree
//! builder, and retrieval engine.

use std::collections::HashMap;

use serde_json::Value;

/// Arbitrary structured context attached to an error, e.g. `{level, tree_id}`.
pub type ErrorContext = HashMap<String, Value>;

fn ctx() -> ErrorContext {
    HashMap::new()
}

#[derive(thiserror::Error, Debug)]
pub enum RaptorError {
    #[error("validation: {message}")]
    Validation { message: String, context: ErrorContext },

    #[error("configuration: {message}")]
    Configuration { message: String, context: ErrorContext },

    #[error("rate limited, retry after {retry_after_secs:?}s: {message}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<f64>,
        context: ErrorContext,
    },

    #[error("context-limit-exceeded: {message}")]
    ContextLimitExceeded { message: String, context: ErrorContext },

    #[error("embedding: {message}")]
    Embedding {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
        context: ErrorContext,
    },

    #[error("clustering: {message}")]
    Clustering { message: String, context: ErrorContext },

    #[error("summarization: {message}")]
    Summarization {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
        context: ErrorContext,
    },

    #[error("persistence: {message}")]
    Persistence {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
        context: ErrorContext,
    },

    #[error("query-too-long: {message}")]
    QueryTooLong { message: String, context: ErrorContext },

    #[error("model-not-supported: {message}")]
    ModelNotSupported { message: String, context: ErrorContext },

    #[error("cancelled: {message}")]
    Cancelled { message: String, context: ErrorContext },
}

impl RaptorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), context: ctx() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), context: ctx() }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after_secs: Option<f64>) -> Self {
        Self::RateLimit { message: message.into(), retry_after_secs, context: ctx() }
    }

    pub fn context_limit_exceeded(message: impl Into<String>) -> Self {
        Self::ContextLimitExceeded { message: message.into(), context: ctx() }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding { message: message.into(), cause: None, context: ctx() }
    }

    pub fn embedding_with_cause(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Embedding { message: message.into(), cause: Some(cause.into()), context: ctx() }
    }

    pub fn clustering(message: impl Into<String>) -> Self {
        Self::Clustering { message: message.into(), context: ctx() }
    }

    pub fn summarization(message: impl Into<String>) -> Self {
        Self::Summarization { message: message.into(), cause: None, context: ctx() }
    }

    pub fn summarization_with_cause(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Summarization { message: message.into(), cause: Some(cause.into()), context: ctx() }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence { message: message.into(), cause: None, context: ctx() }
    }

    pub fn persistence_with_cause(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Persistence { message: message.into(), cause: Some(cause.into()), context: ctx() }
    }

    pub fn query_too_long(message: impl Into<String>) -> Self {
        Self::QueryTooLong { message: message.into(), context: ctx() }
    }

    pub fn model_not_supported(message: impl Into<String>) -> Self {
        Self::ModelNotSupported { message: message.into(), context: ctx() }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled { message: message.into(), context: ctx() }
    }

    /// Attach (or merge) structured context, e.g. `{level, tree_id}` for a
    /// tree-builder failure.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let context = match &mut self {
            Self::Validation { context, .. }
            | Self::Configuration { context, .. }
            | Self::RateLimit { context, .. }
            | Self::ContextLimitExceeded { context, .. }
            | Self::Embedding { context, .. }
            | Self::Clustering { context, .. }
            | Self::Summarization { context, .. }
            | Self::Persistence { context, .. }
            | Self::QueryTooLong { context, .. }
            | Self::ModelNotSupported { context, .. }
            | Self::Cancelled { context, .. } => context,
        };
        context.insert(key.into(), value.into());
        self
    }

    /// Stable machine-readable error code, surfaced to callers alongside
    /// `message` and `context`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Configuration { .. } => "configuration",
            Self::RateLimit { .. } => "rate_limit",
            Self::ContextLimitExceeded { .. } => "context_limit_exceeded",
            Self::Embedding { .. } => "embedding",
            Self::Clustering { .. } => "clustering",
            Self::Summarization { .. } => "summarization",
            Self::Persistence { .. } => "persistence",
            Self::QueryTooLong { .. } => "query_too_long",
            Self::ModelNotSupported { .. } => "model_not_supported",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// HTTP-style status translation, per spec: 400 for validation/
    /// query-too-long, 429 for rate-limit, 500 for everything else.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::QueryTooLong { .. } => 400,
            Self::RateLimit { .. } => 429,
            _ => 500,
        }
    }

    /// Structured context attached via [`Self::with_context`], e.g.
    /// `{level, tree_id}` for a tree-builder failure.
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::Configuration { context, .. }
            | Self::RateLimit { context, .. }
            | Self::ContextLimitExceeded { context, .. }
            | Self::Embedding { context, .. }
            | Self::Clustering { context, .. }
            | Self::Summarization { context, .. }
            | Self::Persistence { context, .. }
            | Self::QueryTooLong { context, .. }
            | Self::ModelNotSupported { context, .. }
            | Self::Cancelled { context, .. } => context,
        }
    }
}

impl From<sqlx::Error> for RaptorError {
    fn from(err: sqlx::Error) -> Self {
        Self::persistence_with_cause(err.to_string(), err)
    }
}

impl From<crate::db::DatabaseError> for RaptorError {
    fn from(err: crate::db::DatabaseError) -> Self {
        Self::persistence_with_cause(err.to_string(), err)
    }
}

pub type Result<T> = std::result::Result<T, RaptorError>;

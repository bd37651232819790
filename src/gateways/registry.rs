//! Logical-model-name to provider routing, shared by the embedding and
//! summarizer gateways.
//!
//! Grounded on the normalize/route pattern of the original service's
//! `ModelRegistry` (lowercase, strip spaces/underscores, map to a provider
//! key) and on the `create_provider` factory match in the teacher's
//! `agent/provider.rs`.

use crate::error::RaptorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Groq,
}

/// Normalize a logical model name the way the route table expects:
/// lowercase, spaces and underscores collapsed to a single separator-free
/// form.
pub fn normalize_model_name(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '_'], "-")
}

/// Resolve a normalized model name to a provider, or
/// `RaptorError::ModelNotSupported` before any I/O is attempted.
pub fn resolve_provider(model: &str) -> Result<Provider, RaptorError> {
    let key = normalize_model_name(model);
    let provider = match key.as_str() {
        "gpt-4o-mini" | "gpt4o-mini" | "gpt-4o" | "text-embedding-3" | "text-embedding-3-small"
        | "text-embedding-3-large" => Provider::OpenAi,
        "claude-3.5-haiku" | "claude-3-5-haiku" | "claude35haiku" | "claude-3-haiku" => Provider::Anthropic,
        "llama-3.1-70b" | "llama3-70b" | "mixtral-8x7b" => Provider::Groq,
        _ => {
            return Err(RaptorError::model_not_supported(format!(
                "unsupported model: {model}"
            )))
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_separators() {
        assert_eq!(normalize_model_name("GPT 4o Mini"), "gpt-4o-mini");
        assert_eq!(normalize_model_name("claude_3.5_haiku"), "claude-3.5-haiku");
    }

    #[test]
    fn resolves_known_models() {
        assert_eq!(resolve_provider("gpt-4o-mini").unwrap(), Provider::OpenAi);
        assert_eq!(resolve_provider("Claude-3.5-Haiku").unwrap(), Provider::Anthropic);
    }

    #[test]
    fn unknown_model_fails_before_io() {
        let err = resolve_provider("not-a-real-model").unwrap_err();
        assert_eq!(err.error_code(), "model_not_supported");
    }
}

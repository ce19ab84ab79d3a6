//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] and [`Embedder`]
//! implementations.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::AgentError;
use crate::llm::provider::LlmProvider;
use crate::source::Embedder;

/// Creates the configured completion provider.
///
/// # Supported Providers
///
/// - `"openai"` (default, `openai` feature): OpenAI-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`AgentError::ApiKeyMissing`] without an API key and
/// [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &EngineConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    let api_key = config.api_key.as_deref().ok_or(AgentError::ApiKeyMissing)?;
    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => Ok(Arc::new(super::providers::OpenAiProvider::new(
            api_key,
            config.base_url.as_deref(),
        ))),
        other => {
            let _ = api_key;
            Err(AgentError::UnsupportedProvider {
                name: other.to_string(),
            })
        }
    }
}

/// Creates the configured query embedder for vector sources.
///
/// # Errors
///
/// Same conditions as [`create_provider`].
pub fn create_embedder(config: &EngineConfig) -> Result<Arc<dyn Embedder>, AgentError> {
    let api_key = config.api_key.as_deref().ok_or(AgentError::ApiKeyMissing)?;
    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => Ok(Arc::new(super::providers::OpenAiEmbedder::new(
            api_key,
            config.base_url.as_deref(),
            &config.embedding_model,
            config.embedding_dimensions,
        ))),
        other => {
            let _ = api_key;
            Err(AgentError::UnsupportedProvider {
                name: other.to_string(),
            })
        }
    }
}

//! LLM integration.
//!
//! The classifier talks to an OpenAI-compatible chat-completions endpoint
//! through the `LlmProvider` trait; `create_provider` builds the concrete
//! client from configuration.

pub mod openai;
pub mod provider;

pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::{ConfigError, LlmError};
use openai::OpenAiProvider;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Build config from environment variables. `OPENAI_API_KEY` is
    /// required; model and endpoint have defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;
        let model =
            std::env::var("MAIL_ASSIST_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("MAIL_ASSIST_LLM_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            api_key: SecretString::from(api_key),
            model,
            base_url,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(
        config.api_key.clone(),
        config.base_url.as_str(),
        config.model.as_str(),
    )?;
    tracing::info!("Using chat-completions endpoint (model: {})", config.model);
    Ok(Arc::new(provider))
}

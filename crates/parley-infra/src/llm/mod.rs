//! LLM provider implementations.
//!
//! Contains the Gemini implementation of the [`LlmProvider`] trait defined
//! in `parley-core`, plus a factory ([`create_provider`]) that builds it from
//! the service configuration.
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod gemini;

use secrecy::SecretString;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_types::config::ParleyConfig;
use parley_types::llm::LlmError;

use self::gemini::GeminiProvider;

/// Create a [`BoxLlmProvider`] for the configured chat model.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no API key is available.
pub fn create_provider(
    config: &ParleyConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
    let provider = GeminiProvider::new(key, config.model.clone(), config.gemini_base_url.clone())?;
    Ok(BoxLlmProvider::new(provider))
}

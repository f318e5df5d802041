//! GeminiProvider -- concrete [`LlmProvider`] implementation for Google Gemini.
//!
//! Sends requests to the Generative Language API (`generateContent` and
//! `streamGenerateContent?alt=sse`). The API key travels in the
//! `x-goog-api-key` header, is wrapped in [`secrecy::SecretString`] and is
//! never logged or included in `Debug` output.

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use secrecy::{ExposeSecret, SecretString};

use parley_core::llm::provider::LlmProvider;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, StreamEvent,
    Usage,
};

use super::streaming::create_gemini_stream;
use super::types::{
    GeminiContent, GeminiRequest, GeminiResponse, GenerationConfig, error_message,
    map_finish_reason,
};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini LLM provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    capabilities: ProviderCapabilities,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    ///
    /// `model` is used when a request leaves its own model empty.
    pub fn new(api_key: SecretString, model: String, base_url: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300)) // 5 min timeout for long generations
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let capabilities = Self::capabilities_for_model(&model);

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            capabilities,
        })
    }

    /// The default model for this provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn capabilities_for_model(model: &str) -> ProviderCapabilities {
        if model.contains("1.5-pro") {
            ProviderCapabilities {
                streaming: true,
                max_context_tokens: 2_097_152,
                max_output_tokens: 8_192,
            }
        } else if model.contains("2.5") {
            ProviderCapabilities {
                streaming: true,
                max_context_tokens: 1_048_576,
                max_output_tokens: 65_536,
            }
        } else {
            ProviderCapabilities {
                streaming: true,
                max_context_tokens: 1_048_576,
                max_output_tokens: 8_192,
            }
        }
    }

    fn resolve_model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.base_url)
    }

    /// Convert a generic [`CompletionRequest`] into a [`GeminiRequest`].
    ///
    /// The system prompt becomes `systemInstruction`; it never appears as a
    /// conversation turn.
    fn to_gemini_request(request: &CompletionRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .map(|m| GeminiContent::text(Some(&m.role.to_string()), &m.content))
            .collect();

        GeminiRequest {
            contents,
            system_instruction: request
                .system
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| GeminiContent::text(None, s)),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        }
    }
}

/// Map a non-2xx status and its body to an [`LlmError`].
pub(crate) fn status_error(status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited,
        400 => LlmError::InvalidRequest(error_message(body)),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {}", error_message(body)),
        },
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = self.resolve_model(request);
        let body = Self::to_gemini_request(request);
        let url = self.url(model, "generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &error_body));
        }

        let gemini_resp: GeminiResponse = response.json().await.map_err(|e| {
            LlmError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        if gemini_resp.candidates.is_empty() {
            let reason = gemini_resp.block_reason().unwrap_or("no candidates");
            return Err(LlmError::Provider {
                message: format!("prompt blocked: {reason}"),
            });
        }

        let stop_reason = gemini_resp
            .finish_reason()
            .map(map_finish_reason)
            .unwrap_or(StopReason::EndTurn);

        Ok(CompletionResponse {
            content: gemini_resp.text(),
            model: gemini_resp
                .model_version
                .clone()
                .unwrap_or_else(|| model.to_string()),
            stop_reason,
            usage: gemini_resp
                .usage_metadata
                .as_ref()
                .map(Usage::from)
                .unwrap_or_default(),
        })
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let body = Self::to_gemini_request(&request);
        let url = format!(
            "{}?alt=sse",
            self.url(self.resolve_model(&request), "streamGenerateContent")
        );

        tracing::debug!(model = %self.resolve_model(&request), "opening gemini stream");
        create_gemini_stream(&self.client, &url, body, &self.api_key)
    }
}

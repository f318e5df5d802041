//! Service configuration types for Parley.
//!
//! `ParleyConfig` represents the top-level `config.toml` that controls the
//! listen address, model selection, and chat-turn policy. Every field has a
//! default, so an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};

/// Persona instruction prepended to every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful chatbot. Answer user's chat with markdown format.";

/// Top-level configuration for the Parley server.
///
/// Loaded from `~/.parley/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Model used for streamed chat responses.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for topic summaries. Falls back to `model` when unset.
    #[serde(default)]
    pub topic_model: Option<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Summarize the topic while the post-append history has at most this
    /// many messages.
    #[serde(default = "default_topic_history_threshold")]
    pub topic_history_threshold: usize,

    /// Consecutive infrastructure failures before a session is closed.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Timeout for the chat-ownership lookup made by `join_chat_room`.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3003
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_tokens() -> u32 {
    8_192
}

fn default_temperature() -> f64 {
    0.7
}

fn default_topic_history_threshold() -> usize {
    3
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_join_timeout_ms() -> u64 {
    2_000
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

impl ParleyConfig {
    /// The model used for topic summaries.
    pub fn topic_model(&self) -> &str {
        self.topic_model.as_deref().unwrap_or(&self.model)
    }
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model: default_model(),
            topic_model: None,
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            topic_history_threshold: default_topic_history_threshold(),
            max_consecutive_failures: default_max_consecutive_failures(),
            join_timeout_ms: default_join_timeout_ms(),
            gemini_base_url: default_gemini_base_url(),
        }
    }
}

//! Chat and message types for Parley.
//!
//! A `Chat` belongs to exactly one user and owns an ordered list of
//! `ChatMessage`s. Both are persisted; the topic is derived, never supplied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;

/// A conversation owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub user_id: i64,
    /// Short derived label. `None` until the topic summarizer has run.
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single persisted message within a chat.
///
/// Messages are immutable once created and ordered by creation within a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a message; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub role: MessageRole,
    pub content: String,
}

impl From<&ChatMessage> for crate::llm::Message {
    fn from(message: &ChatMessage) -> Self {
        crate::llm::Message {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

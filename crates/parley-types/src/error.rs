use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Failure of a single chat turn.
///
/// The orchestrator converts every failure into one of these at the turn
/// boundary. `client_message` is the only text that ever reaches a client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad or missing turn fields. Rejected before any side effect.
    #[error("invalid turn: {0}")]
    Validation(String),

    /// The chat exists but belongs to another user, or does not exist where
    /// existence is required.
    #[error("chat {0} not found for user")]
    ChatNotFound(i64),

    /// Storage failure (unreachable database, failed query, failed commit).
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    /// Provider failure, including a stream that ended before completing.
    #[error("provider error: {0}")]
    Provider(LlmError),

    /// The outbound side of the duplex channel is gone.
    #[error("stream peer disconnected")]
    PeerGone,

    /// The session was cancelled (client disconnected).
    #[error("turn cancelled")]
    Cancelled,
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => ChatError::Cancelled,
            other => ChatError::Provider(other),
        }
    }
}

impl ChatError {
    /// Transport faults end the whole session, not just the turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::PeerGone | ChatError::Cancelled)
    }

    /// Storage and provider failures count toward escalation.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ChatError::Storage(_) | ChatError::Provider(_))
    }

    /// Sanitized message for the client. Never includes internal detail.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Validation(reason) => format!("The given data was invalid: {reason}"),
            ChatError::ChatNotFound(_) => "Chat not found".to_string(),
            ChatError::Storage(_) | ChatError::Provider(_) => {
                "An error occurred while sending message".to_string()
            }
            ChatError::PeerGone | ChatError::Cancelled => "Connection closed".to_string(),
        }
    }
}

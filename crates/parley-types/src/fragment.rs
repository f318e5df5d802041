//! Transport-only types for the chat stream.
//!
//! `MessageFragment` is what flows back to clients while a response is being
//! generated. `TurnRequest` and `StreamReply` are the two directions of the
//! long-lived duplex channel between the gateway relay and the orchestrator.
//! None of these are persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle marker of a fragment within one logical response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FragmentStatus {
    Start,
    Progress,
    End,
}

impl fmt::Display for FragmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentStatus::Start => write!(f, "START"),
            FragmentStatus::Progress => write!(f, "PROGRESS"),
            FragmentStatus::End => write!(f, "END"),
        }
    }
}

/// One piece of a streamed response.
///
/// A response is exactly one `Start`, zero or more `Progress`, then exactly
/// one `End`. The persisted model message is the concatenation of the
/// `Progress` parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFragment {
    pub chat_id: i64,
    pub part: String,
    pub status: FragmentStatus,
}

impl MessageFragment {
    pub fn start(chat_id: i64, banner: impl Into<String>) -> Self {
        Self {
            chat_id,
            part: banner.into(),
            status: FragmentStatus::Start,
        }
    }

    pub fn progress(chat_id: i64, part: impl Into<String>) -> Self {
        Self {
            chat_id,
            part: part.into(),
            status: FragmentStatus::Progress,
        }
    }

    pub fn end(chat_id: i64, banner: impl Into<String>) -> Self {
        Self {
            chat_id,
            part: banner.into(),
            status: FragmentStatus::End,
        }
    }
}

/// Client-to-server frame: one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Target chat. `None` (or `Some(0)`) starts a new chat.
    pub chat_id: Option<i64>,
    pub user_id: i64,
    pub text: String,
}

impl TurnRequest {
    /// The requested chat id, with `0` normalized to "no chat".
    pub fn target_chat(&self) -> Option<i64> {
        self.chat_id.filter(|id| *id != 0)
    }
}

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamReply {
    /// A fragment of the response for the current turn.
    Fragment(MessageFragment),
    /// The current turn failed and persisted nothing. The channel stays open.
    TurnFailed {
        chat_id: Option<i64>,
        /// Sanitized, user-facing message. Never carries internal detail.
        message: String,
    },
}

//! Chat turn processing for Parley.
//!
//! - `repository`: storage ports (committed reads, write transactions, ownership directory)
//! - `transaction`: read-side chat resolution, then lookup-or-create and append in one transaction
//! - `topic`: topic summarization for young chats
//! - `orchestrator`: the long-lived per-connection stream session

pub mod orchestrator;
pub mod repository;
pub mod topic;
pub mod transaction;

pub use orchestrator::{ChatStreamService, StreamChannel, TurnSettings};

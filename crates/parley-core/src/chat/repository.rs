//! Storage ports for chats and messages.
//!
//! Follows the RPITIT pattern: implementations live in parley-infra
//! (e.g., `SqliteChatStore`) and the core never names a database crate.

use parley_types::chat::{Chat, ChatMessage, NewMessage};
use parley_types::error::RepositoryError;

/// A store of chats: committed-state reads plus short write transactions.
///
/// Reads never wait on an open transaction, so one connection's turn does
/// not hold up another's.
pub trait ChatStore: Send + Sync {
    type Tx: ChatTransaction;

    /// Look up a committed chat by id, regardless of owner.
    fn find_chat(
        &self,
        chat_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// All committed messages of a chat in creation order.
    fn list_messages(
        &self,
        chat_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Open a new transaction. It belongs to exactly one turn.
    fn begin(&self) -> impl std::future::Future<Output = Result<Self::Tx, RepositoryError>> + Send;
}

/// Operations that run inside one storage transaction.
///
/// Nothing written through a transaction is visible to other readers until
/// `commit`. Dropping a transaction without committing rolls it back.
pub trait ChatTransaction: Send {
    /// Look up a chat by id, regardless of owner.
    fn find_chat(
        &mut self,
        chat_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// Create an empty chat with no topic.
    fn create_chat(
        &mut self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Chat, RepositoryError>> + Send;

    fn insert_message(
        &mut self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// Set the chat topic and bump `updated_at`.
    fn update_topic(
        &mut self,
        chat_id: i64,
        topic: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn commit(self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn rollback(self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Read-only, non-transactional chat lookups used by the relay.
pub trait ChatDirectory: Send + Sync {
    /// The chat, if it exists and belongs to `user_id`.
    fn find_owned_chat(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;
}

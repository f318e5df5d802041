//! Persistence Transaction Manager.
//!
//! `ensure_chat` and `append_messages` run inside a caller-supplied
//! transaction so they compose atomically with each other and with the topic
//! update. `resolve_chat` is the read-side check made before a turn streams.

use parley_types::chat::{Chat, ChatMessage, MessageRole, NewMessage};
use parley_types::error::{ChatError, RepositoryError};

use super::repository::{ChatStore, ChatTransaction};

/// Resolve the target chat from committed state, without writing.
///
/// Returns the chat when the caller owns it and `None` when a new chat will
/// be created at commit. A foreign chat is `ChatError::ChatNotFound`.
pub async fn resolve_chat<S: ChatStore>(
    store: &S,
    user_id: i64,
    chat_id: Option<i64>,
) -> Result<Option<Chat>, ChatError> {
    let Some(id) = chat_id.filter(|id| *id != 0) else {
        return Ok(None);
    };

    match store.find_chat(id).await {
        Ok(Some(chat)) if chat.user_id == user_id => Ok(Some(chat)),
        Ok(Some(_)) => Err(ChatError::ChatNotFound(id)),
        Ok(None) | Err(RepositoryError::NotFound) => {
            tracing::debug!(chat_id = id, user_id, "chat not found, a new one will be created");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve the target chat, creating it when it does not exist.
///
/// `None` or `Some(0)` always creates. A chat that exists but belongs to a
/// different user is `ChatError::ChatNotFound`. Any other lookup failure is
/// returned as a storage error.
pub async fn ensure_chat<T: ChatTransaction>(
    tx: &mut T,
    user_id: i64,
    chat_id: Option<i64>,
) -> Result<Chat, ChatError> {
    if let Some(id) = chat_id.filter(|id| *id != 0) {
        match tx.find_chat(id).await {
            Ok(Some(chat)) if chat.user_id == user_id => return Ok(chat),
            Ok(Some(_)) => return Err(ChatError::ChatNotFound(id)),
            Ok(None) | Err(RepositoryError::NotFound) => {
                tracing::debug!(chat_id = id, user_id, "chat not found, creating a new one");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let chat = tx.create_chat(user_id).await?;
    tracing::info!(chat_id = chat.id, user_id, "created chat");
    Ok(chat)
}

/// Append one exchange: the user message, then the model message.
pub async fn append_messages<T: ChatTransaction>(
    tx: &mut T,
    chat_id: i64,
    user_id: i64,
    user_text: &str,
    model_text: &str,
) -> Result<(ChatMessage, ChatMessage), ChatError> {
    let user = tx
        .insert_message(&NewMessage {
            chat_id,
            user_id,
            role: MessageRole::User,
            content: user_text.to_string(),
        })
        .await?;

    let model = tx
        .insert_message(&NewMessage {
            chat_id,
            user_id,
            role: MessageRole::Model,
            content: model_text.to_string(),
        })
        .await?;

    Ok((user, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryChatStore;

    #[tokio::test]
    async fn test_resolve_chat_reads_committed_state() {
        let store = MemoryChatStore::new();
        let owned = store.seed_chat(7, 1);
        let foreign = store.seed_chat(8, 0);

        let found = resolve_chat(&store, 7, Some(owned.id)).await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(owned.id));
        assert!(resolve_chat(&store, 7, None).await.unwrap().is_none());
        assert!(resolve_chat(&store, 7, Some(0)).await.unwrap().is_none());
        assert!(resolve_chat(&store, 7, Some(999)).await.unwrap().is_none());

        let err = resolve_chat(&store, 7, Some(foreign.id)).await.unwrap_err();
        assert!(matches!(err, ChatError::ChatNotFound(id) if id == foreign.id));
        assert_eq!(store.begin_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_chat_propagates_read_failure() {
        let store = MemoryChatStore::new();
        let owned = store.seed_chat(7, 0);
        store.fail_on("find_chat");
        let err = resolve_chat(&store, 7, Some(owned.id)).await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));
    }

    #[tokio::test]
    async fn test_ensure_chat_creates_when_absent() {
        let store = MemoryChatStore::new();
        let mut tx = store.begin().await.unwrap();
        let chat = ensure_chat(&mut tx, 7, None).await.unwrap();
        assert_eq!(chat.user_id, 7);
        assert!(chat.topic.is_none());
        tx.commit().await.unwrap();
        assert_eq!(store.chats().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_chat_zero_means_new() {
        let store = MemoryChatStore::new();
        let existing = store.seed_chat(7, 0);
        let mut tx = store.begin().await.unwrap();
        let chat = ensure_chat(&mut tx, 7, Some(0)).await.unwrap();
        assert_ne!(chat.id, existing.id);
    }

    #[tokio::test]
    async fn test_ensure_chat_unknown_id_creates_new() {
        let store = MemoryChatStore::new();
        let mut tx = store.begin().await.unwrap();
        let chat = ensure_chat(&mut tx, 7, Some(999)).await.unwrap();
        assert_ne!(chat.id, 999);
        assert_eq!(chat.user_id, 7);
    }

    #[tokio::test]
    async fn test_ensure_chat_returns_owned_chat() {
        let store = MemoryChatStore::new();
        let existing = store.seed_chat(7, 2);
        let mut tx = store.begin().await.unwrap();
        let chat = ensure_chat(&mut tx, 7, Some(existing.id)).await.unwrap();
        assert_eq!(chat.id, existing.id);
    }

    #[tokio::test]
    async fn test_ensure_chat_rejects_foreign_chat() {
        let store = MemoryChatStore::new();
        let existing = store.seed_chat(8, 0);
        let mut tx = store.begin().await.unwrap();
        let err = ensure_chat(&mut tx, 7, Some(existing.id)).await.unwrap_err();
        assert!(matches!(err, ChatError::ChatNotFound(id) if id == existing.id));
    }

    #[tokio::test]
    async fn test_ensure_chat_propagates_lookup_failure() {
        let store = MemoryChatStore::new();
        let existing = store.seed_chat(7, 0);
        store.fail_on("find_chat");
        let mut tx = store.begin().await.unwrap();
        let err = ensure_chat(&mut tx, 7, Some(existing.id)).await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));
    }

    #[tokio::test]
    async fn test_append_messages_orders_user_then_model() {
        let store = MemoryChatStore::new();
        let mut tx = store.begin().await.unwrap();
        let chat = ensure_chat(&mut tx, 7, None).await.unwrap();
        let (user, model) = append_messages(&mut tx, chat.id, 7, "hello", "Hi!")
            .await
            .unwrap();
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(model.role, MessageRole::Model);
        assert!(user.id < model.id);
        tx.commit().await.unwrap();

        let messages = store.messages(chat.id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "Hi!");
    }

    #[tokio::test]
    async fn test_rollback_discards_both_messages() {
        let store = MemoryChatStore::new();
        let existing = store.seed_chat(7, 0);
        let mut tx = store.begin().await.unwrap();
        append_messages(&mut tx, existing.id, 7, "hello", "Hi!")
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert!(store.messages(existing.id).is_empty());
    }

    #[tokio::test]
    async fn test_failed_model_insert_leaves_nothing_after_rollback() {
        let store = MemoryChatStore::new();
        let existing = store.seed_chat(7, 0);
        store.fail_on_nth_insert(2);
        let mut tx = store.begin().await.unwrap();
        let err = append_messages(&mut tx, existing.id, 7, "hello", "Hi!")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));
        tx.rollback().await.unwrap();
        assert!(store.messages(existing.id).is_empty());
    }
}

//! SQLite chat store.
//!
//! Implements `ChatStore` (committed reads on the reader pool, turn
//! transactions on the writer pool) and `ChatDirectory` (ownership lookups
//! on the reader pool) from `parley-core`. Raw queries, private Row structs.

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};

use parley_core::chat::repository::{ChatDirectory, ChatStore, ChatTransaction};
use parley_types::chat::{Chat, ChatMessage, MessageRole, NewMessage};
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed chat store.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// One turn's transaction on the writer connection.
///
/// Dropping it without `commit` rolls back.
pub struct SqliteChatTransaction {
    tx: Transaction<'static, Sqlite>,
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    id: i64,
    user_id: i64,
    topic: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            topic: row.try_get("topic")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, RepositoryError> {
        Ok(Chat {
            id: self.id,
            user_id: self.user_id,
            topic: self.topic,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: i64,
    chat_id: i64,
    user_id: i64,
    role: String,
    content: String,
    created_at: String,
    updated_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ChatMessage {
            id: self.id,
            chat_id: self.chat_id,
            user_id: self.user_id,
            role,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn chat_from_row(row: Option<sqlx::sqlite::SqliteRow>) -> Result<Option<Chat>, RepositoryError> {
    match row {
        Some(row) => {
            let chat_row =
                ChatRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            Ok(Some(chat_row.into_chat()?))
        }
        None => Ok(None),
    }
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Port implementations
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    type Tx = SqliteChatTransaction;

    async fn find_chat(&self, chat_id: i64) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        chat_from_row(row)
    }

    async fn list_messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE chat_id = ? ORDER BY id ASC")
            .bind(chat_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_message()?);
        }

        Ok(messages)
    }

    async fn begin(&self) -> Result<SqliteChatTransaction, RepositoryError> {
        let tx = self.pool.writer.begin().await.map_err(query_error)?;
        Ok(SqliteChatTransaction { tx })
    }
}

impl ChatTransaction for SqliteChatTransaction {
    async fn find_chat(&mut self, chat_id: i64) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(query_error)?;

        chat_from_row(row)
    }

    async fn create_chat(&mut self, user_id: i64) -> Result<Chat, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO chats (user_id, topic, created_at, updated_at) VALUES (?, NULL, ?, ?)",
        )
        .bind(user_id)
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        Ok(Chat {
            id: result.last_insert_rowid(),
            user_id,
            topic: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn insert_message(&mut self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO messages (chat_id, user_id, role, content, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.chat_id)
        .bind(message.user_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            chat_id: message.chat_id,
            user_id: message.user_id,
            role: message.role,
            content: message.content.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_topic(&mut self, chat_id: i64, topic: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chats SET topic = ?, updated_at = ? WHERE id = ?")
            .bind(topic)
            .bind(format_datetime(&Utc::now()))
            .bind(chat_id)
            .execute(&mut *self.tx)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await.map_err(query_error)
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await.map_err(query_error)
    }
}

impl ChatDirectory for SqliteChatStore {
    async fn find_owned_chat(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        chat_from_row(row)
    }
}

//! Access token verification.
//!
//! Tokens are SHA-256 hashed and compared against the `access_tokens` table.
//! Only the digest is ever stored.

use sha2::{Digest, Sha256};
use sqlx::Row;

use parley_core::auth::TokenVerifier;
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;

/// Compute SHA-256 hash of an access token (lowercase hex).
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}

/// `TokenVerifier` backed by the `access_tokens` table.
#[derive(Clone)]
pub struct SqliteTokenVerifier {
    pool: DatabasePool,
}

impl SqliteTokenVerifier {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl TokenVerifier for SqliteTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Option<i64>, RepositoryError> {
        if token.is_empty() {
            return Ok(None);
        }

        let token_hash = hash_token(token);
        let row = sqlx::query("SELECT user_id FROM access_tokens WHERE token_hash = ?")
            .bind(&token_hash)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: i64 = row
            .try_get("user_id")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Update last_used_at (best effort) without holding up the handshake.
        let writer = self.pool.writer.clone();
        tokio::spawn(async move {
            let now = chrono::Utc::now().to_rfc3339();
            if let Err(e) = sqlx::query("UPDATE access_tokens SET last_used_at = ? WHERE token_hash = ?")
                .bind(&now)
                .bind(&token_hash)
                .execute(&writer)
                .await
            {
                tracing::debug!(error = %e, "failed to record token use");
            }
        });

        Ok(Some(user_id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    async fn insert_token(pool: &DatabasePool, token: &str, user_id: i64) {
        sqlx::query(
            "INSERT INTO access_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(hash_token(token))
        .bind(user_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&pool.writer)
        .await
        .unwrap();
    }

    #[test]
    fn test_hash_token_known_value() {
        // SHA-256 of empty string
        assert_eq!(
            hash_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_token_is_lowercase_hex() {
        let hash = hash_token("pk_live_abc");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[tokio::test]
    async fn test_verify_known_token() {
        let pool = test_pool().await;
        insert_token(&pool, "secret-token", 42).await;

        let verifier = SqliteTokenVerifier::new(pool);
        assert_eq!(verifier.verify("secret-token").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_verify_unknown_token() {
        let pool = test_pool().await;
        insert_token(&pool, "secret-token", 42).await;

        let verifier = SqliteTokenVerifier::new(pool);
        assert_eq!(verifier.verify("other-token").await.unwrap(), None);
        assert_eq!(verifier.verify("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_verify_records_last_used() {
        let pool = test_pool().await;
        insert_token(&pool, "secret-token", 42).await;

        let verifier = SqliteTokenVerifier::new(pool.clone());
        verifier.verify("secret-token").await.unwrap();

        let mut last_used: Option<String> = None;
        for _ in 0..50 {
            let row: (Option<String>,) =
                sqlx::query_as("SELECT last_used_at FROM access_tokens WHERE token_hash = ?")
                    .bind(hash_token("secret-token"))
                    .fetch_one(&pool.reader)
                    .await
                    .unwrap();
            last_used = row.0;
            if last_used.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(last_used.is_some());
    }
}

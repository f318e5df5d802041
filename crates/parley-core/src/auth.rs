//! Connection authentication port.
//!
//! Credential issuance lives elsewhere. The relay only needs to turn an
//! opaque access token into a user id before it opens a stream session.

use parley_types::error::RepositoryError;

/// Resolves access tokens to user ids.
///
/// Implementations live in parley-infra (e.g., `SqliteTokenVerifier`).
pub trait TokenVerifier: Send + Sync {
    /// `Ok(None)` means the token is unknown. `Err` means the lookup itself failed.
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;
}

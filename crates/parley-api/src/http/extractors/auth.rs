//! Access token authentication extractor.
//!
//! Extracts the access token from:
//! - `?token=<token>` on the request URI (browsers cannot set headers on a
//!   WebSocket handshake)
//! - `Authorization: Bearer <token>` header
//!
//! The token is resolved to a user id by the `TokenVerifier` before the
//! WebSocket upgrade completes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use parley_core::auth::TokenVerifier;

use crate::http::error::AppError;
use crate::state::AppState;

/// The authenticated caller's user id.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub i64);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;

        match state.verifier.verify(&token).await? {
            Some(user_id) => Ok(AuthenticatedUser(user_id)),
            None => Err(AppError::Unauthorized("Invalid access token".to_string())),
        }
    }
}

/// Extract the access token from the query string or headers.
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(token) = parts.uri.query().and_then(token_from_query) {
        return Ok(token);
    }

    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    Err(AppError::Unauthorized(
        "Missing access token. Provide via '?token=<token>' or 'Authorization: Bearer <token>'."
            .to_string(),
    ))
}

fn token_from_query(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

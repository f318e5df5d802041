//! HTTP layer for Parley.
//!
//! Axum router with the `/ws/chat` WebSocket relay (token-authenticated)
//! and an unauthenticated `/health` check.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;

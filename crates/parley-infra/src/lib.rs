//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: SQLite
//! storage (chats, messages, access tokens), the Gemini provider, and the
//! configuration loader.

pub mod config;
pub mod llm;
pub mod sqlite;

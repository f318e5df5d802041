//! Chat orchestration and port definitions for Parley.
//!
//! This crate defines the "ports" (storage, directory, token and provider
//! traits) that the infrastructure layer implements, plus the logic that
//! drives a chat turn and relays its fragments to connected clients. It
//! depends only on `parley-types`, never on `parley-infra` or any
//! database/IO crate.

pub mod auth;
pub mod chat;
pub mod llm;
pub mod relay;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

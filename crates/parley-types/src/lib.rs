//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley services:
//! Chat, Message, MessageFragment, the duplex stream frames, LLM request shapes,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod fragment;
pub mod llm;

//! Stream Transport Adapter.
//!
//! Turns one provider call into a lazy, ordered sequence of text parts that
//! the orchestrator frames as `START` / `PROGRESS` / `END` fragments.

pub mod adapter;

pub use adapter::{TextStream, complete_text, stream_text};

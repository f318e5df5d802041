//! Route handlers.

pub mod ws;

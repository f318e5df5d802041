//! Gateway Realtime Relay logic.
//!
//! Transport-agnostic pieces of the client-facing relay: the per-chat room
//! registry, the JSON event protocol, and the per-connection session that
//! bridges client events to an orchestrator stream. The WebSocket plumbing
//! lives in parley-api.

pub mod protocol;
pub mod rooms;
pub mod session;

pub use protocol::{ClientCommand, ClientEvent, ProtocolError};
pub use rooms::{RoomRegistry, room_name};
pub use session::{RelayError, RelaySession};

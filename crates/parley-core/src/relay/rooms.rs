//! Process-wide chat room registry.
//!
//! Maps chat id -> connections subscribed to that chat. All access goes
//! through `RoomRegistry`; the map itself is never exposed.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::protocol::ClientEvent;

/// Deterministic group name for a chat.
pub fn room_name(chat_id: i64) -> String {
    format!("chat_{chat_id}")
}

/// Per-chat broadcast groups.
///
/// Each member is a connection id plus the sender feeding that
/// connection's outbound socket. Join, leave and broadcast lock only the
/// shard holding the chat.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<i64, HashMap<Uuid, mpsc::UnboundedSender<ClientEvent>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a chat. Joining twice is a no-op.
    pub fn join(&self, chat_id: i64, conn_id: Uuid, sender: mpsc::UnboundedSender<ClientEvent>) {
        let mut room = self.rooms.entry(chat_id).or_default();
        if room.insert(conn_id, sender).is_none() {
            debug!(room = %room_name(chat_id), %conn_id, members = room.len(), "joined room");
        }
    }

    /// Unsubscribe a connection. Returns whether it was a member.
    pub fn leave(&self, chat_id: i64, conn_id: Uuid) -> bool {
        let removed = match self.rooms.get_mut(&chat_id) {
            Some(mut room) => room.remove(&conn_id).is_some(),
            None => false,
        };
        self.rooms.remove_if(&chat_id, |_, room| room.is_empty());
        removed
    }

    /// Unsubscribe a connection from every listed chat.
    pub fn leave_all(&self, conn_id: Uuid, chat_ids: impl IntoIterator<Item = i64>) {
        for chat_id in chat_ids {
            self.leave(chat_id, conn_id);
        }
    }

    /// Deliver an event to every member of a chat's room.
    ///
    /// Members whose connection is gone are dropped from the room. Returns
    /// the number of connections the event reached.
    pub fn broadcast(&self, chat_id: i64, event: &ClientEvent) -> usize {
        let delivered = match self.rooms.get_mut(&chat_id) {
            Some(mut room) => {
                room.retain(|conn_id, sender| {
                    let alive = sender.send(event.clone()).is_ok();
                    if !alive {
                        debug!(room = %room_name(chat_id), %conn_id, "pruned closed member");
                    }
                    alive
                });
                room.len()
            }
            None => 0,
        };
        self.rooms.remove_if(&chat_id, |_, room| room.is_empty());
        delivered
    }

    /// Number of connections subscribed to a chat.
    pub fn members(&self, chat_id: i64) -> usize {
        self.rooms.get(&chat_id).map(|room| room.len()).unwrap_or(0)
    }

    pub fn is_member(&self, chat_id: i64, conn_id: Uuid) -> bool {
        self.rooms
            .get(&chat_id)
            .map(|room| room.contains_key(&conn_id))
            .unwrap_or(false)
    }

    /// Number of chats with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.rooms.len())
            .finish()
    }
}

//! Per-connection relay session.
//!
//! A `RelaySession` belongs to one authenticated client connection. It
//! turns inbound client frames into orchestrator turns and routes the
//! orchestrator's replies back out, either to a chat room or to this
//! connection alone.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::fragment::{StreamReply, TurnRequest};

use super::protocol::{ClientCommand, ClientEvent};
use super::rooms::{RoomRegistry, room_name};
use crate::chat::orchestrator::PENDING_CHAT_ID;
use crate::chat::repository::ChatDirectory;

/// Faults that end the relay session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The orchestrator side of the stream is gone.
    #[error("orchestrator stream closed")]
    StreamClosed,

    /// The client's outbound queue is gone.
    #[error("client connection closed")]
    ClientGone,
}

/// Outcome of an ownership lookup.
enum Ownership {
    Owned,
    NotOwned,
    Unavailable,
}

pub struct RelaySession<D: ChatDirectory> {
    conn_id: Uuid,
    user_id: i64,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    rooms: Arc<RoomRegistry>,
    directory: Arc<D>,
    turns: mpsc::UnboundedSender<TurnRequest>,
    joined: HashSet<i64>,
    lookup_timeout: Duration,
}

impl<D: ChatDirectory> RelaySession<D> {
    pub fn new(
        user_id: i64,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        rooms: Arc<RoomRegistry>,
        directory: Arc<D>,
        turns: mpsc::UnboundedSender<TurnRequest>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            conn_id: Uuid::now_v7(),
            user_id,
            outbound,
            rooms,
            directory,
            turns,
            joined: HashSet::new(),
            lookup_timeout,
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Chats this connection is subscribed to.
    pub fn joined(&self) -> &HashSet<i64> {
        &self.joined
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames are answered with an `error` event and never reach
    /// the orchestrator.
    pub async fn handle_frame(&mut self, text: &str) -> Result<(), RelayError> {
        let command = ClientEvent::from_text(text).and_then(|event| ClientCommand::parse(&event));
        match command {
            Ok(ClientCommand::JoinChatRoom { chat_id }) => self.join(chat_id).await,
            Ok(ClientCommand::CreateMessage { chat_id, message }) => self.send(chat_id, message),
            Err(err) => {
                debug!(conn_id = %self.conn_id, error = %err, "rejected client frame");
                self.reply(ClientEvent::error(err.to_string()))
            }
        }
    }

    /// Subscribe to a chat's room after confirming the caller owns it.
    ///
    /// Refusals leave subscriptions unchanged.
    pub async fn join(&mut self, chat_id: i64) -> Result<(), RelayError> {
        match self.check_ownership(chat_id).await {
            Ownership::Owned => {
                self.subscribe(chat_id);
                self.reply(ClientEvent::notice(format!("Joined chat room {chat_id}")))
            }
            Ownership::NotOwned => self.reply(ClientEvent::error("Chat not found")),
            Ownership::Unavailable => self.reply(ClientEvent::error("Failed to get chat")),
        }
    }

    /// Forward a user message to the orchestrator.
    ///
    /// No lookup happens here: the orchestrator creates or refuses the chat,
    /// and the connection joins the room when the reply confirms it.
    pub fn send(&self, chat_id: Option<i64>, text: String) -> Result<(), RelayError> {
        self.turns
            .send(TurnRequest {
                chat_id,
                user_id: self.user_id,
                text,
            })
            .map_err(|_| RelayError::StreamClosed)
    }

    /// Route one orchestrator reply to the client(s).
    ///
    /// A fragment naming a chat goes to that chat's room so every connection
    /// watching it sees the same stream. The orchestrator only names chats
    /// this user owns, so the connection joins the room first. Fragments of
    /// a not-yet-committed chat and failure notices go to this connection
    /// only.
    pub fn route_reply(&mut self, reply: StreamReply) -> Result<(), RelayError> {
        match reply {
            StreamReply::Fragment(fragment) if fragment.chat_id != PENDING_CHAT_ID => {
                self.subscribe(fragment.chat_id);
                let event = ClientEvent::fragment(&fragment, true);
                let reached = self.rooms.broadcast(fragment.chat_id, &event);
                if reached == 0 {
                    warn!(room = %room_name(fragment.chat_id), "room had no live members");
                }
                Ok(())
            }
            StreamReply::Fragment(fragment) => self.reply(ClientEvent::fragment(&fragment, false)),
            StreamReply::TurnFailed { message, .. } => self.reply(ClientEvent::error(message)),
        }
    }

    /// Leave every room. Called when the connection ends; also runs on drop.
    pub fn close(&mut self) {
        if !self.joined.is_empty() {
            self.rooms.leave_all(self.conn_id, self.joined.drain());
        }
    }

    fn subscribe(&mut self, chat_id: i64) {
        self.rooms.join(chat_id, self.conn_id, self.outbound.clone());
        if self.joined.insert(chat_id) {
            info!(conn_id = %self.conn_id, user_id = self.user_id, room = %room_name(chat_id), "subscribed");
        }
    }

    async fn check_ownership(&self, chat_id: i64) -> Ownership {
        let lookup = self.directory.find_owned_chat(chat_id, self.user_id);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Some(_))) => Ownership::Owned,
            Ok(Ok(None)) => Ownership::NotOwned,
            Ok(Err(e)) => {
                warn!(chat_id, user_id = self.user_id, error = %e, "chat lookup failed");
                Ownership::Unavailable
            }
            Err(_) => {
                warn!(chat_id, user_id = self.user_id, timeout = ?self.lookup_timeout, "chat lookup timed out");
                Ownership::Unavailable
            }
        }
    }

    fn reply(&self, event: ClientEvent) -> Result<(), RelayError> {
        self.outbound.send(event).map_err(|_| RelayError::ClientGone)
    }
}

impl<D: ChatDirectory> Drop for RelaySession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

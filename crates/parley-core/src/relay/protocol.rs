//! Client event protocol.
//!
//! Every frame in both directions is `{"event": "<name>", "data": <json>}`.
//! Inbound frames are parsed into a `ClientCommand`; anything malformed
//! becomes a `ProtocolError` whose text is safe to show the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use parley_types::fragment::{FragmentStatus, MessageFragment};

pub const JOIN_CHAT_ROOM: &str = "join_chat_room";
pub const CREATE_MESSAGE: &str = "create_message";

pub const ERROR: &str = "error";
pub const MESSAGE: &str = "message";
pub const MESSAGE_START: &str = "message_start";
pub const MESSAGE_END: &str = "message_end";

/// Progress event name for a chat the connection is subscribed to.
pub fn chat_event(chat_id: i64) -> String {
    format!("message_chat_{chat_id}")
}

/// One frame on the client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR, serde_json::json!({ "message": message.into() }))
    }

    /// Plain informational message, e.g. a join acknowledgement.
    pub fn notice(message: impl Into<String>) -> Self {
        Self::new(MESSAGE, serde_json::json!({ "message": message.into() }))
    }

    /// Fragment event. Subscribed chats get `message_chat_<id>` for
    /// progress; everything else falls back to `message`.
    pub fn fragment(fragment: &MessageFragment, subscribed: bool) -> Self {
        let event = match fragment.status {
            FragmentStatus::Start => MESSAGE_START.to_string(),
            FragmentStatus::End => MESSAGE_END.to_string(),
            FragmentStatus::Progress if subscribed => chat_event(fragment.chat_id),
            FragmentStatus::Progress => MESSAGE.to_string(),
        };
        let data = serde_json::to_value(fragment).unwrap_or(Value::Null);
        Self::new(event, data)
    }

    /// Parse a text frame.
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|_| ProtocolError::MalformedData)
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","data":{"message":"Failed to encode event"}}"#.to_string()
        })
    }
}

/// Malformed client input. `Display` is the client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Failed to parse data")]
    MalformedData,

    #[error("Chat ID must be a number")]
    InvalidChatId,

    #[error("Message must be a string")]
    InvalidMessage,

    #[error("The given data was invalid: {0}")]
    Invalid(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

/// A parsed inbound client operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    JoinChatRoom { chat_id: i64 },
    CreateMessage { chat_id: Option<i64>, message: String },
}

impl ClientCommand {
    pub fn parse(event: &ClientEvent) -> Result<Self, ProtocolError> {
        match event.event.as_str() {
            JOIN_CHAT_ROOM => {
                let data = event.data.as_object().ok_or(ProtocolError::MalformedData)?;
                match parse_chat_id(data.get("chat_id"))? {
                    Some(chat_id) => Ok(ClientCommand::JoinChatRoom { chat_id }),
                    None => Err(ProtocolError::Invalid("chat_id is required".to_string())),
                }
            }
            CREATE_MESSAGE => {
                let data = event.data.as_object().ok_or(ProtocolError::MalformedData)?;
                let chat_id = parse_chat_id(data.get("chat_id"))?;
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::InvalidMessage)?;
                if message.trim().is_empty() {
                    return Err(ProtocolError::Invalid("message is required".to_string()));
                }
                Ok(ClientCommand::CreateMessage {
                    chat_id,
                    message: message.to_string(),
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Accepts a non-negative integer or a numeric string. `null`, absent and
/// `0` all mean "no chat".
fn parse_chat_id(value: Option<&Value>) -> Result<Option<i64>, ProtocolError> {
    let id = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    let id = id
        .and_then(|id| i64::try_from(id).ok())
        .ok_or(ProtocolError::InvalidChatId)?;
    Ok((id != 0).then_some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event: &str, data: Value) -> ClientEvent {
        ClientEvent::new(event, data)
    }

    #[test]
    fn test_parse_join_with_number_and_string() {
        let cmd = ClientCommand::parse(&frame(JOIN_CHAT_ROOM, json!({"chat_id": 42}))).unwrap();
        assert_eq!(cmd, ClientCommand::JoinChatRoom { chat_id: 42 });

        let cmd = ClientCommand::parse(&frame(JOIN_CHAT_ROOM, json!({"chat_id": "42"}))).unwrap();
        assert_eq!(cmd, ClientCommand::JoinChatRoom { chat_id: 42 });
    }

    #[test]
    fn test_parse_join_requires_chat_id() {
        let err = ClientCommand::parse(&frame(JOIN_CHAT_ROOM, json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "The given data was invalid: chat_id is required");
    }

    #[test]
    fn test_parse_rejects_non_numeric_chat_id() {
        for bad in [json!("abc"), json!(-1), json!(1.5), json!(true)] {
            let err = ClientCommand::parse(&frame(
                CREATE_MESSAGE,
                json!({"chat_id": bad, "message": "hi"}),
            ))
            .unwrap_err();
            assert_eq!(err, ProtocolError::InvalidChatId);
            assert_eq!(err.to_string(), "Chat ID must be a number");
        }
    }

    #[test]
    fn test_parse_create_message_without_chat() {
        for data in [
            json!({"message": "hello"}),
            json!({"chat_id": null, "message": "hello"}),
            json!({"chat_id": 0, "message": "hello"}),
        ] {
            let cmd = ClientCommand::parse(&frame(CREATE_MESSAGE, data)).unwrap();
            assert_eq!(
                cmd,
                ClientCommand::CreateMessage {
                    chat_id: None,
                    message: "hello".to_string()
                }
            );
        }
    }

    #[test]
    fn test_parse_create_message_rejects_bad_message() {
        let err = ClientCommand::parse(&frame(CREATE_MESSAGE, json!({"chat_id": 1, "message": 5})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Message must be a string");

        let err = ClientCommand::parse(&frame(CREATE_MESSAGE, json!({"chat_id": 1}))).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidMessage);

        let err = ClientCommand::parse(&frame(CREATE_MESSAGE, json!({"message": "  "})))
            .unwrap_err();
        assert_eq!(err.to_string(), "The given data was invalid: message is required");
    }

    #[test]
    fn test_parse_non_object_data() {
        let err = ClientCommand::parse(&frame(CREATE_MESSAGE, json!("hello"))).unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse data");
    }

    #[test]
    fn test_parse_unknown_event() {
        let err = ClientCommand::parse(&frame("leave", json!({}))).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(name) if name == "leave"));
    }

    #[test]
    fn test_from_text_rejects_garbage() {
        assert_eq!(
            ClientEvent::from_text("not json").unwrap_err(),
            ProtocolError::MalformedData
        );
        let event = ClientEvent::from_text(r#"{"event":"create_message"}"#).unwrap();
        assert!(event.data.is_null());
    }

    #[test]
    fn test_fragment_event_names() {
        let start = ClientEvent::fragment(&MessageFragment::start(42, "Starting chat..."), true);
        assert_eq!(start.event, MESSAGE_START);
        assert_eq!(start.data["status"], "START");

        let progress = MessageFragment::progress(42, "Hel");
        assert_eq!(ClientEvent::fragment(&progress, true).event, "message_chat_42");
        assert_eq!(ClientEvent::fragment(&progress, false).event, MESSAGE);

        let end = ClientEvent::fragment(&MessageFragment::end(42, "Chat ended."), false);
        assert_eq!(end.event, MESSAGE_END);
    }

    #[test]
    fn test_error_frame_shape() {
        let text = ClientEvent::error("Unauthorized").to_text();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"event": "error", "data": {"message": "Unauthorized"}}));
    }
}

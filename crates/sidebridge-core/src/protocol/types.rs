//! Payload types carried by tagged worker output.
//!
//! Field names follow the JSON the worker prints. Optional fields that
//! the worker omits are skipped again on serialization so a decoded
//! payload re-encodes to the same shape.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A chat room as listed by `CMD:ROOMS` and `CMD:MYROOMS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub users: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Presence of a user in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Away,
}

/// A member of the current room as listed by `CMD:USERS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub status: UserStatus,
}

/// Severity of a connection status notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Error,
}

/// Connection progress reported by the worker (`CMD:STATUS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    #[serde(rename = "type")]
    pub kind: StatusKind,
    pub message: String,
}

/// A room or direct message (`CMD:MSG`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_private: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl ChatMessage {
    /// The other party of a direct message, seen from `me`.
    pub fn counterpart(&self, me: &str) -> Option<&str> {
        if !self.is_private {
            return None;
        }
        if self.sender == me {
            self.receiver.as_deref()
        } else {
            Some(self.sender.as_str())
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// A decoded event, one variant per output channel.
///
/// Serializes as `{"channel": "<name>", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum ChannelEvent {
    RoomsUpdated(Vec<Room>),
    #[serde(rename = "myrooms-updated")]
    MyRoomsUpdated(Vec<Room>),
    UsersUpdated(Vec<User>),
    ConnectionSuccess,
    ConnectionStatus(ConnectionStatus),
    MessageReceived(ChatMessage),
    SongReceived(PathBuf),
}

impl ChannelEvent {
    /// Channel name this event is delivered on.
    pub const fn channel(&self) -> &'static str {
        match self {
            Self::RoomsUpdated(_) => super::channels::ROOMS_UPDATED,
            Self::MyRoomsUpdated(_) => super::channels::MYROOMS_UPDATED,
            Self::UsersUpdated(_) => super::channels::USERS_UPDATED,
            Self::ConnectionSuccess => super::channels::CONNECTION_SUCCESS,
            Self::ConnectionStatus(_) => super::channels::CONNECTION_STATUS,
            Self::MessageReceived(_) => super::channels::MESSAGE_RECEIVED,
            Self::SongReceived(_) => super::channels::SONG_RECEIVED,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn private_message_reencodes_to_worker_shape() {
        let json = r#"{"sender":"bob","receiver":"alice","content":"hey","room":"General","isPrivate":true}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_private);
        assert_eq!(msg.counterpart("alice"), Some("bob"));
        assert_eq!(msg.counterpart("bob"), Some("alice"));

        let original: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_value(&msg).unwrap(), original);
    }

    #[test]
    fn room_message_has_no_counterpart() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"sender":"A","content":"hi","room":"General"}"#).unwrap();
        assert_eq!(msg.counterpart("A"), None);
    }

    #[test]
    fn status_uses_type_field() {
        let status: ConnectionStatus =
            serde_json::from_str(r#"{"type":"error", "message":"no server"}"#).unwrap();
        assert_eq!(status.kind, StatusKind::Error);
    }

    #[test]
    fn unknown_user_status_is_rejected() {
        let res: Result<User, _> =
            serde_json::from_str(r#"{"id":0,"name":"x","status":"busy"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn channel_event_serializes_with_channel_name() {
        let event = ChannelEvent::MyRoomsUpdated(vec![Room {
            name: "General".into(),
            users: 2,
            id: None,
        }]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["channel"], event.channel());
        assert_eq!(value["payload"][0]["users"], 2);

        let value = serde_json::to_value(ChannelEvent::ConnectionSuccess).unwrap();
        assert_eq!(value["channel"], "connection-success");
    }
}

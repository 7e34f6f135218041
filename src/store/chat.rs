//! Chat conversation metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-on-one conversation
    Direct,
    /// Group conversation
    Group,
}

/// Represents a chat conversation
///
/// Chats are created on first fetch or on demand-creation of a direct
/// message pair. The client never destroys them; authoritative deletion is
/// reflected by absence on the next full fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// Chat identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Direct message or group
    pub kind: ChatKind,
    /// Preview of the most recent message
    pub last_message: Option<String>,
    /// Timestamp of the most recent message
    pub last_message_at: Option<DateTime<Utc>>,
    /// Number of messages the viewer has not read
    pub unread_count: u32,
    /// Participant user ids
    pub participants: Vec<String>,
}

impl Chat {
    /// Create a new chat with no messages
    pub fn new(id: String, name: String, kind: ChatKind) -> Self {
        Self {
            id,
            name,
            kind,
            last_message: None,
            last_message_at: None,
            unread_count: 0,
            participants: Vec::new(),
        }
    }

    /// Update the last-message preview if `at` is not older than the
    /// current one. Out-of-order arrivals must not roll the preview back.
    pub fn touch(&mut self, preview: &str, at: DateTime<Utc>) {
        if self.last_message_at.map_or(true, |current| at >= current) {
            self.last_message = Some(preview.to_string());
            self.last_message_at = Some(at);
        }
    }
}

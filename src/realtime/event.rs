//! Events and signals delivered over the realtime channel

use crate::store::{ChatMessage, Presence};
use serde::{Deserialize, Serialize};

/// A push event for a subscribed chat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// A message was created in the chat. For locally-originated messages
    /// the payload echoes the temporary client id, which reconciliation
    /// keys on.
    MessageCreated(ChatMessage),
    /// A message was read
    MessageRead {
        /// Owning chat
        chat_id: String,
        /// The message that was read
        message_id: String,
        /// Who read it
        reader_id: String,
    },
    /// A user started typing
    TypingStarted {
        /// Owning chat
        chat_id: String,
        /// The typing user
        user_id: String,
    },
    /// A user stopped typing
    TypingStopped {
        /// Owning chat
        chat_id: String,
        /// The user that stopped
        user_id: String,
    },
    /// A user's presence changed
    PresenceChanged {
        /// The affected user
        user_id: String,
        /// New presence
        presence: Presence,
    },
}

/// Transport lifecycle notification, independent of any one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// The channel acknowledged the connection is open
    Open,
    /// A heartbeat was missed; events may have been dropped
    HeartbeatMissed,
    /// The transport reported an error
    ChannelError(String),
}

/// A locally-authored message handed to the channel for publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Client-generated id, echoed back by the server
    pub client_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Sender display name
    pub sender_name: String,
    /// Message body text
    pub body: String,
}

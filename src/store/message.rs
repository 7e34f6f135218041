//! Message structures and delivery status tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Optimistic local entry, dispatch in progress
    Sending,
    /// Accepted by the server
    Sent,
    /// Confirmed via the realtime channel
    Delivered,
    /// Read by the other side (own messages) or by the viewer (peer messages)
    Read,
    /// Dispatch failed after exhausting retries; recoverable via manual retry
    Failed,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Sending
    }
}

impl DeliveryStatus {
    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Status only moves forward (`Sending` → `Sent` → `Delivered` →
    /// `Read`); `Failed` is reachable only from `Sending`, and a failed
    /// message may go back to `Sending` when the user retries it.
    pub fn can_transition(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Sending, Sent)
                | (Sending, Delivered)
                | (Sending, Read)
                | (Sending, Failed)
                | (Sent, Delivered)
                | (Sent, Read)
                | (Delivered, Read)
                | (Failed, Sending)
        )
    }
}

/// Represents a message within a chat
///
/// The body is immutable once created; only the delivery status (and the
/// canonical id, once the server assigns one) may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Canonical message id. For an optimistic entry this starts as the
    /// client-generated UUID and is replaced by the server-assigned id
    /// during reconciliation.
    pub id: String,
    /// Temporary client-generated id carried through the send round trip;
    /// reconciliation keys on it
    pub client_id: Option<String>,
    /// Owning chat id
    pub chat_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Sender display name
    pub sender_name: String,
    /// Message body text
    pub body: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Delivery status
    #[serde(default)]
    pub status: DeliveryStatus,
    /// Whether the current viewer authored this message
    #[serde(default)]
    pub is_own: bool,
}

impl ChatMessage {
    /// Build an optimistic outgoing message in `Sending` state.
    ///
    /// The id and client id start out as the same fresh UUID; the server
    /// later assigns the canonical id while the client id survives for
    /// reconciliation.
    pub fn outgoing(chat_id: &str, sender_id: &str, sender_name: &str, body: &str) -> Self {
        let client_id = Uuid::new_v4().to_string();
        Self {
            id: client_id.clone(),
            client_id: Some(client_id),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            status: DeliveryStatus::Sending,
            is_own: true,
        }
    }

    /// Apply a status transition, re-reading the current status first.
    ///
    /// Returns whether the transition was applied; disallowed transitions
    /// (e.g., downgrading `Delivered` back to `Sent`) leave the message
    /// untouched.
    pub fn apply_status(&mut self, next: DeliveryStatus) -> bool {
        if self.status.can_transition(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Human-readable delivery status indicator
    pub fn status_indicator(&self) -> &str {
        match self.status {
            DeliveryStatus::Sending => "…",
            DeliveryStatus::Sent => "✓",
            DeliveryStatus::Delivered => "✓✓",
            DeliveryStatus::Read => "✓✓",
            DeliveryStatus::Failed => "✗",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_starts_sending_with_client_id() {
        let msg = ChatMessage::outgoing("c1", "u1", "Alice", "hello");

        assert_eq!(msg.status, DeliveryStatus::Sending);
        assert!(msg.is_own);
        assert_eq!(msg.client_id.as_deref(), Some(msg.id.as_str()));
    }

    #[test]
    fn test_status_never_regresses() {
        let mut msg = ChatMessage::outgoing("c1", "u1", "Alice", "hello");

        assert!(msg.apply_status(DeliveryStatus::Delivered));
        // The REST ack arriving after the realtime push must not downgrade.
        assert!(!msg.apply_status(DeliveryStatus::Sent));
        assert_eq!(msg.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_failed_only_from_sending() {
        assert!(DeliveryStatus::Sending.can_transition(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Sent.can_transition(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Delivered.can_transition(DeliveryStatus::Failed));
    }

    #[test]
    fn test_retry_reopens_failed() {
        let mut msg = ChatMessage::outgoing("c1", "u1", "Alice", "hello");
        assert!(msg.apply_status(DeliveryStatus::Failed));
        assert!(msg.apply_status(DeliveryStatus::Sending));
        assert_eq!(msg.status, DeliveryStatus::Sending);
    }
}

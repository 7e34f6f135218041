//! Folds realtime events into the cache store
//!
//! One reconciler task runs per subscribed chat. Every event goes through
//! the store's merge/status operations, so de-duplication and ordering stay
//! centralized; the reconciler itself never assumes arrival order implies
//! temporal order.

use crate::realtime::event::RealtimeEvent;
use crate::store::{CacheStore, DeliveryStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Spawn the reconciler task for one subscribed chat.
///
/// The task ends when the event stream closes (unsubscribe or channel
/// teardown); aborting it stops any further events from being applied.
pub fn spawn(
    store: Arc<CacheStore>,
    chat_id: String,
    viewer_id: String,
    typing_expiry: Duration,
    mut events: mpsc::Receiver<RealtimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Reconciler started for chat {}", chat_id);
        while let Some(event) = events.recv().await {
            apply_event(&store, &chat_id, &viewer_id, typing_expiry, event);
        }
        debug!("Event stream closed for chat {}", chat_id);
    })
}

/// Apply one event to the store.
///
/// Events addressed to a different chat than the subscription are dropped;
/// a per-chat stream should never carry them, and applying them would
/// bypass the subscription lifecycle.
pub fn apply_event(
    store: &CacheStore,
    subscribed_chat_id: &str,
    viewer_id: &str,
    typing_expiry: Duration,
    event: RealtimeEvent,
) {
    match event {
        RealtimeEvent::MessageCreated(mut msg) => {
            if msg.chat_id != subscribed_chat_id {
                debug!(
                    "Dropping message event for chat {} on subscription {}",
                    msg.chat_id, subscribed_chat_id
                );
                return;
            }

            msg.is_own = msg.sender_id == viewer_id;
            if msg.is_own {
                // The realtime copy of an own message is the delivery
                // confirmation, whatever status the transport attached.
                msg.status = DeliveryStatus::Delivered;
            }

            let preview = msg.body.clone();
            let at = msg.created_at;
            let own = msg.is_own;

            store.merge_messages(subscribed_chat_id, vec![msg]);
            store.touch_chat_preview(subscribed_chat_id, &preview, at);
            if !own {
                store.recompute_unread(subscribed_chat_id);
            }
        }
        RealtimeEvent::MessageRead {
            chat_id,
            message_id,
            reader_id,
        } => {
            if chat_id != subscribed_chat_id {
                return;
            }
            debug!(
                "Message {} in chat {} read by {}",
                message_id, chat_id, reader_id
            );
            store.update_message_status(&chat_id, &message_id, DeliveryStatus::Read);
            store.recompute_unread(&chat_id);
        }
        RealtimeEvent::TypingStarted { chat_id, user_id } => {
            if chat_id != subscribed_chat_id || user_id == viewer_id {
                return;
            }
            store.set_typing(&chat_id, &user_id, Instant::now() + typing_expiry);
        }
        RealtimeEvent::TypingStopped { chat_id, user_id } => {
            if chat_id != subscribed_chat_id {
                return;
            }
            store.clear_typing(&chat_id, &user_id);
        }
        RealtimeEvent::PresenceChanged { user_id, presence } => {
            store.apply_presence(&user_id, presence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheTtl;
    use crate::store::{Chat, ChatKind, ChatMessage};
    use chrono::Utc;

    const EXPIRY: Duration = Duration::from_secs(5);

    fn test_store() -> CacheStore {
        let store = CacheStore::new(CacheTtl::default());
        store.set_chats(vec![Chat::new(
            "c1".to_string(),
            "General".to_string(),
            ChatKind::Group,
        )]);
        store
    }

    fn peer_created(id: &str) -> RealtimeEvent {
        RealtimeEvent::MessageCreated(ChatMessage {
            id: id.to_string(),
            client_id: None,
            chat_id: "c1".to_string(),
            sender_id: "peer".to_string(),
            sender_name: "Peer".to_string(),
            body: "hi there".to_string(),
            created_at: Utc::now(),
            status: DeliveryStatus::Delivered,
            is_own: false,
        })
    }

    #[tokio::test]
    async fn test_peer_message_updates_store_and_unread() {
        let store = test_store();

        apply_event(&store, "c1", "me", EXPIRY, peer_created("m1"));

        let messages = store.peek_messages("c1").expect("messages present");
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_own);

        let chats = store.peek_chats().expect("chats present");
        assert_eq!(chats[0].unread_count, 1);
        assert_eq!(chats[0].last_message.as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn test_duplicate_created_event_is_idempotent() {
        let store = test_store();

        apply_event(&store, "c1", "me", EXPIRY, peer_created("m1"));
        apply_event(&store, "c1", "me", EXPIRY, peer_created("m1"));

        assert_eq!(store.peek_messages("c1").expect("messages").len(), 1);
        assert_eq!(store.peek_chats().expect("chats")[0].unread_count, 1);
    }

    #[tokio::test]
    async fn test_created_event_reconciles_optimistic_entry() {
        let store = test_store();
        let optimistic = ChatMessage::outgoing("c1", "me", "Me", "hello");
        let client_id = optimistic.client_id.clone().expect("client id");
        store.merge_messages("c1", vec![optimistic]);

        let authoritative = ChatMessage {
            id: "srv-9".to_string(),
            client_id: Some(client_id),
            chat_id: "c1".to_string(),
            sender_id: "me".to_string(),
            sender_name: "Me".to_string(),
            body: "hello".to_string(),
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            is_own: false, // transports do not know the viewer
        };
        apply_event(
            &store,
            "c1",
            "me",
            EXPIRY,
            RealtimeEvent::MessageCreated(authoritative),
        );

        let messages = store.peek_messages("c1").expect("messages");
        assert_eq!(messages.len(), 1, "optimistic entry replaced, not duplicated");
        assert_eq!(messages[0].id, "srv-9");
        assert_eq!(messages[0].status, DeliveryStatus::Delivered);
        assert!(messages[0].is_own);
    }

    #[tokio::test]
    async fn test_read_event_updates_status_and_unread() {
        let store = test_store();
        apply_event(&store, "c1", "me", EXPIRY, peer_created("m1"));

        apply_event(
            &store,
            "c1",
            "me",
            EXPIRY,
            RealtimeEvent::MessageRead {
                chat_id: "c1".to_string(),
                message_id: "m1".to_string(),
                reader_id: "me".to_string(),
            },
        );

        let messages = store.peek_messages("c1").expect("messages");
        assert_eq!(messages[0].status, DeliveryStatus::Read);
        assert_eq!(store.peek_chats().expect("chats")[0].unread_count, 0);
    }

    #[tokio::test]
    async fn test_event_for_other_chat_is_dropped() {
        let store = test_store();

        let mut event = peer_created("m1");
        if let RealtimeEvent::MessageCreated(msg) = &mut event {
            msg.chat_id = "c2".to_string();
        }
        apply_event(&store, "c1", "me", EXPIRY, event);

        assert!(store.peek_messages("c1").is_none());
        assert!(store.peek_messages("c2").is_none());
    }

    #[tokio::test]
    async fn test_own_typing_signal_is_ignored() {
        let store = test_store();

        apply_event(
            &store,
            "c1",
            "me",
            EXPIRY,
            RealtimeEvent::TypingStarted {
                chat_id: "c1".to_string(),
                user_id: "me".to_string(),
            },
        );

        assert!(store.typing_users("c1").is_empty());
    }

    #[tokio::test]
    async fn test_spawned_reconciler_consumes_stream() {
        let store = Arc::new(test_store());
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn(
            store.clone(),
            "c1".to_string(),
            "me".to_string(),
            EXPIRY,
            rx,
        );

        tx.send(peer_created("m1")).await.expect("send event");
        drop(tx);
        handle.await.expect("reconciler exits cleanly");

        assert_eq!(store.peek_messages("c1").expect("messages").len(), 1);
    }
}

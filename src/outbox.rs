//! Optimistic send pipeline
//!
//! A user-authored message materializes locally in `Sending` state before
//! any network I/O, then reconciles with the authoritative copy (or fails
//! visibly). The pipeline guarantees the list never shows two rows for one
//! logical message, and a failed send stays recoverable through
//! [`retry_message`] instead of silently disappearing.

use crate::realtime::{OutgoingMessage, RealtimeChannel};
use crate::retry::{self, RetryPolicy};
use crate::store::{CacheStore, ChatMessage, DeliveryStatus};
use crate::{Error, Result};
use tracing::{info, warn};

/// Send a message to a chat, optimistically and with bounded retries.
///
/// The optimistic entry is inserted before dispatch; on success it is
/// reconciled with the server acknowledgment (a realtime delivery that
/// arrives first wins — the late acknowledgment cannot downgrade it), and
/// on exhausted failure it is marked `Failed` but kept visible.
pub async fn send_message(
    store: &CacheStore,
    channel: &dyn RealtimeChannel,
    policy: &RetryPolicy,
    sender_id: &str,
    sender_name: &str,
    chat_id: &str,
    body: &str,
) -> Result<ChatMessage> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::Validation("message body is empty".to_string()));
    }

    let optimistic = ChatMessage::outgoing(chat_id, sender_id, sender_name, body);
    let client_id = optimistic.id.clone();
    let created_at = optimistic.created_at;

    store.merge_messages(chat_id, vec![optimistic]);
    store.touch_chat_preview(chat_id, body, created_at);

    dispatch(
        store,
        channel,
        policy,
        chat_id,
        &client_id,
        sender_id,
        sender_name,
        body,
    )
    .await
}

/// Re-dispatch a message that previously failed, without duplicating it.
///
/// The entry is addressed by canonical or client id, flipped back to
/// `Sending`, and pushed through the same dispatch path as a fresh send. A
/// message that is not in `Failed` state is returned as-is.
pub async fn retry_message(
    store: &CacheStore,
    channel: &dyn RealtimeChannel,
    policy: &RetryPolicy,
    chat_id: &str,
    message_id: &str,
) -> Result<ChatMessage> {
    let message = store
        .peek_messages(chat_id)
        .and_then(|messages| {
            messages
                .into_iter()
                .find(|m| m.id == message_id || m.client_id.as_deref() == Some(message_id))
        })
        .ok_or_else(|| {
            Error::Validation(format!("no message {} in chat {}", message_id, chat_id))
        })?;

    if message.status != DeliveryStatus::Failed {
        info!(
            "Message {} in chat {} is {:?}, nothing to retry",
            message_id, chat_id, message.status
        );
        return Ok(message);
    }

    let client_id = message
        .client_id
        .clone()
        .ok_or_else(|| Error::Validation(format!("message {} has no client id", message_id)))?;

    store.update_message_status(chat_id, &client_id, DeliveryStatus::Sending);

    dispatch(
        store,
        channel,
        policy,
        chat_id,
        &client_id,
        &message.sender_id,
        &message.sender_name,
        &message.body,
    )
    .await
}

/// Shared dispatch step: publish under retry, then reconcile or fail.
#[allow(clippy::too_many_arguments)]
async fn dispatch(
    store: &CacheStore,
    channel: &dyn RealtimeChannel,
    policy: &RetryPolicy,
    chat_id: &str,
    client_id: &str,
    sender_id: &str,
    sender_name: &str,
    body: &str,
) -> Result<ChatMessage> {
    let result = retry::run(policy, || {
        channel.send(
            chat_id,
            OutgoingMessage {
                client_id: client_id.to_string(),
                sender_id: sender_id.to_string(),
                sender_name: sender_name.to_string(),
                body: body.to_string(),
            },
        )
    })
    .await;

    match result {
        Ok(mut ack) => {
            info!("Message {} delivered to chat {}", ack.id, chat_id);
            ack.is_own = true;

            // The acknowledgment reconciles the optimistic entry by client
            // id; if the realtime push already upgraded it to `Delivered`,
            // the merge keeps the higher status.
            let mut reconciled = ack.clone();
            reconciled.status = DeliveryStatus::Sent;
            store.merge_messages(chat_id, vec![reconciled]);

            Ok(ack)
        }
        Err(e) => {
            warn!(
                "Failed to deliver message {} to chat {}: {}. Marking failed.",
                client_id, chat_id, e
            );
            store.update_message_status(chat_id, client_id, DeliveryStatus::Failed);
            Err(e)
        }
    }
}

//! Unread accounting
//!
//! Per-chat unread counts are recomputed from message statuses rather than
//! incremented ad hoc, so the numbers cannot drift; the global total is
//! always the sum across chats.
//!
//! Marking a chat as read is an explicit operation: the caller decides when
//! the user is actively reading, merely opening a conversation's history
//! view does not fire it.

use crate::Result;
use crate::api::ChatApi;
use crate::retry::{self, RetryPolicy};
use crate::store::CacheStore;
use tracing::info;

/// Mark every peer message in a chat as read.
///
/// Posts the read marker (under retry), then updates local message
/// statuses and recomputes the chat's unread count from them.
pub async fn mark_chat_as_read(
    store: &CacheStore,
    api: &dyn ChatApi,
    policy: &RetryPolicy,
    chat_id: &str,
) -> Result<()> {
    retry::run(policy, || api.mark_read(chat_id)).await?;

    let changed = store.mark_messages_read(chat_id);
    if store.peek_messages(chat_id).is_some() {
        store.recompute_unread(chat_id);
    } else {
        // History never fetched; trust the read marker we just posted.
        store.set_unread(chat_id, 0);
    }

    info!(
        "Marked chat {} as read ({} messages updated)",
        chat_id, changed
    );
    Ok(())
}

/// Total unread count across all chats.
///
/// Pure read over current cache state; never triggers network I/O.
pub fn total_unread_count(store: &CacheStore) -> u32 {
    store.total_unread()
}

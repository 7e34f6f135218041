//! Time-boxed in-memory cache store
//!
//! Single source of truth for chats, per-chat message lists, directory
//! users, and the typing map. Every read compares the entry age against a
//! per-kind TTL and fails soft (returns `None`) on staleness; every
//! mutation emits a [`StoreEvent`] so observers can re-render.
//!
//! Message lists are only ever mutated through [`CacheStore::merge_messages`]
//! and the targeted status operations, which keeps the de-duplication and
//! ordering invariants in one place.

use crate::config::CacheTtl;
use crate::store::chat::Chat;
use crate::store::message::{ChatMessage, DeliveryStatus};
use crate::store::user::{DirectoryUser, Presence};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

/// Kinds of cached data, each with its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// The chat list
    Chats,
    /// Per-chat message pages
    Messages,
    /// The user directory
    Users,
}

/// Change notification emitted on every mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The chat list changed (membership, previews, unread counts)
    ChatsChanged,
    /// A chat's message list changed
    MessagesChanged {
        /// The affected chat
        chat_id: String,
    },
    /// The user directory changed
    UsersChanged,
    /// The set of users typing in a chat changed
    TypingChanged {
        /// The affected chat
        chat_id: String,
    },
}

/// Cached value plus its fetch timestamp
#[derive(Debug)]
struct Stamped<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Stamped<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: std::time::Duration) -> bool {
        self.fetched_at.elapsed() <= ttl
    }
}

#[derive(Debug, Default)]
struct Inner {
    chats: Option<Stamped<Vec<Chat>>>,
    messages: HashMap<String, Stamped<Vec<ChatMessage>>>,
    users: Option<Stamped<Vec<DirectoryUser>>>,
    typing: HashMap<String, HashMap<String, Instant>>,
}

/// In-memory cache store with per-kind TTL and change events
pub struct CacheStore {
    inner: Mutex<Inner>,
    ttl: CacheTtl,
    events: broadcast::Sender<StoreEvent>,
}

impl CacheStore {
    /// Create an empty store with the given TTL settings
    pub fn new(ttl: CacheTtl) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            events,
        }
    }

    /// Subscribe to change events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("lock poisoned")
    }

    fn notify(&self, event: StoreEvent) {
        // No receivers is fine; observers are optional.
        let _ = self.events.send(event);
    }

    // --- chats ---

    /// Cached chat list, or `None` if absent or stale
    pub fn get_chats(&self) -> Option<Vec<Chat>> {
        let inner = self.lock();
        inner
            .chats
            .as_ref()
            .filter(|entry| entry.is_fresh(self.ttl.chats))
            .map(|entry| entry.value.clone())
    }

    /// Chat list regardless of staleness (advisory read for rendering)
    pub fn peek_chats(&self) -> Option<Vec<Chat>> {
        let inner = self.lock();
        inner.chats.as_ref().map(|entry| entry.value.clone())
    }

    /// Replace the chat list with a fresh fetch
    pub fn set_chats(&self, chats: Vec<Chat>) {
        {
            let mut inner = self.lock();
            inner.chats = Some(Stamped::new(chats));
        }
        self.notify(StoreEvent::ChatsChanged);
    }

    /// Insert or replace a single chat (keyed by id)
    pub fn upsert_chat(&self, chat: Chat) {
        {
            let mut inner = self.lock();
            let entry = inner.chats.get_or_insert_with(|| Stamped::new(Vec::new()));
            match entry.value.iter_mut().find(|c| c.id == chat.id) {
                Some(existing) => *existing = chat,
                None => entry.value.push(chat),
            }
        }
        self.notify(StoreEvent::ChatsChanged);
    }

    /// Update a chat's last-message preview
    pub fn touch_chat_preview(
        &self,
        chat_id: &str,
        preview: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) {
        let touched = {
            let mut inner = self.lock();
            match inner
                .chats
                .as_mut()
                .and_then(|entry| entry.value.iter_mut().find(|c| c.id == chat_id))
            {
                Some(chat) => {
                    chat.touch(preview, at);
                    true
                }
                None => false,
            }
        };
        if touched {
            self.notify(StoreEvent::ChatsChanged);
        }
    }

    // --- messages ---

    /// Cached message list for a chat, or `None` if absent or stale
    pub fn get_messages(&self, chat_id: &str) -> Option<Vec<ChatMessage>> {
        let inner = self.lock();
        inner
            .messages
            .get(chat_id)
            .filter(|entry| entry.is_fresh(self.ttl.messages))
            .map(|entry| entry.value.clone())
    }

    /// Message list regardless of staleness (advisory read for rendering)
    pub fn peek_messages(&self, chat_id: &str) -> Option<Vec<ChatMessage>> {
        let inner = self.lock();
        inner
            .messages
            .get(chat_id)
            .map(|entry| entry.value.clone())
    }

    /// Merge messages into a chat's list and return the merged result.
    ///
    /// Three rules, applied per incoming message:
    /// 1. A matching `client_id` reconciles the optimistic entry in place,
    ///    preserving its list position and adopting the server id and
    ///    timestamp.
    /// 2. A matching canonical id is a duplicate delivery; only the status
    ///    may advance.
    /// 3. Otherwise the message is appended and the list re-sorted by
    ///    (timestamp, id), so arrival order never dictates render order.
    pub fn merge_messages(&self, chat_id: &str, incoming: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let merged = {
            let mut inner = self.lock();
            let entry = inner
                .messages
                .entry(chat_id.to_string())
                .or_insert_with(|| Stamped::new(Vec::new()));
            let list = &mut entry.value;
            let mut appended = false;

            for msg in incoming {
                // Rule 1: reconcile by temporary client id.
                if let Some(client_id) = msg.client_id.clone() {
                    if let Some(existing) = list
                        .iter_mut()
                        .find(|m| m.client_id.as_deref() == Some(client_id.as_str()))
                    {
                        let prev_status = existing.status;
                        *existing = msg;
                        if !prev_status.can_transition(existing.status) {
                            existing.status = prev_status;
                        }
                        continue;
                    }
                }

                // Rule 2: de-duplicate by canonical id.
                if let Some(existing) = list.iter_mut().find(|m| m.id == msg.id) {
                    if existing.status.can_transition(msg.status) {
                        existing.status = msg.status;
                    }
                    continue;
                }

                // Rule 3: append.
                list.push(msg);
                appended = true;
            }

            if appended {
                list.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
            entry.fetched_at = Instant::now();
            list.clone()
        };

        self.notify(StoreEvent::MessagesChanged {
            chat_id: chat_id.to_string(),
        });
        merged
    }

    /// Apply a status transition to one message, addressed by canonical id
    /// or by temporary client id.
    ///
    /// The current status is re-read under the lock, so out-of-sequence
    /// updates (a late REST ack after a realtime delivery) are dropped.
    pub fn update_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        next: DeliveryStatus,
    ) -> bool {
        let applied = {
            let mut inner = self.lock();
            inner
                .messages
                .get_mut(chat_id)
                .and_then(|entry| {
                    entry.value.iter_mut().find(|m| {
                        m.id == message_id || m.client_id.as_deref() == Some(message_id)
                    })
                })
                .map(|msg| msg.apply_status(next))
                .unwrap_or(false)
        };

        if applied {
            self.notify(StoreEvent::MessagesChanged {
                chat_id: chat_id.to_string(),
            });
        } else {
            debug!(
                "Status transition to {:?} not applied for message {} in chat {}",
                next, message_id, chat_id
            );
        }
        applied
    }

    /// Mark every peer-authored message in a chat as read.
    ///
    /// Returns how many messages changed status.
    pub fn mark_messages_read(&self, chat_id: &str) -> usize {
        let changed = {
            let mut inner = self.lock();
            match inner.messages.get_mut(chat_id) {
                Some(entry) => entry
                    .value
                    .iter_mut()
                    .filter(|m| !m.is_own)
                    .map(|m| m.apply_status(DeliveryStatus::Read))
                    .filter(|&changed| changed)
                    .count(),
                None => 0,
            }
        };

        if changed > 0 {
            self.notify(StoreEvent::MessagesChanged {
                chat_id: chat_id.to_string(),
            });
        }
        changed
    }

    // --- unread accounting ---

    /// Recompute a chat's unread count from message statuses.
    ///
    /// Counts peer-authored messages not yet `Read`. Only runs once a
    /// message list exists for the chat; before that, the server-provided
    /// count from the chat list stands.
    pub fn recompute_unread(&self, chat_id: &str) {
        let updated = {
            let mut inner = self.lock();
            let count = match inner.messages.get(chat_id) {
                Some(entry) => entry
                    .value
                    .iter()
                    .filter(|m| !m.is_own && m.status != DeliveryStatus::Read)
                    .count() as u32,
                None => return,
            };

            match inner
                .chats
                .as_mut()
                .and_then(|entry| entry.value.iter_mut().find(|c| c.id == chat_id))
            {
                Some(chat) if chat.unread_count != count => {
                    chat.unread_count = count;
                    true
                }
                _ => false,
            }
        };

        if updated {
            self.notify(StoreEvent::ChatsChanged);
        }
    }

    /// Set a chat's unread count directly.
    ///
    /// Used when no message list is loaded to recompute from, e.g. marking
    /// a chat read before its history was ever fetched.
    pub fn set_unread(&self, chat_id: &str, count: u32) {
        let updated = {
            let mut inner = self.lock();
            match inner
                .chats
                .as_mut()
                .and_then(|entry| entry.value.iter_mut().find(|c| c.id == chat_id))
            {
                Some(chat) if chat.unread_count != count => {
                    chat.unread_count = count;
                    true
                }
                _ => false,
            }
        };

        if updated {
            self.notify(StoreEvent::ChatsChanged);
        }
    }

    /// Total unread count across all chats.
    ///
    /// Pure read over current cache state; never triggers I/O and ignores
    /// staleness (counts should not vanish when the chat list ages out).
    pub fn total_unread(&self) -> u32 {
        let inner = self.lock();
        inner
            .chats
            .as_ref()
            .map(|entry| entry.value.iter().map(|c| c.unread_count).sum())
            .unwrap_or(0)
    }

    // --- users ---

    /// Cached directory, or `None` if absent or stale
    pub fn get_users(&self) -> Option<Vec<DirectoryUser>> {
        let inner = self.lock();
        inner
            .users
            .as_ref()
            .filter(|entry| entry.is_fresh(self.ttl.users))
            .map(|entry| entry.value.clone())
    }

    /// Directory regardless of staleness
    pub fn peek_users(&self) -> Option<Vec<DirectoryUser>> {
        let inner = self.lock();
        inner.users.as_ref().map(|entry| entry.value.clone())
    }

    /// Replace the directory with a fresh fetch
    pub fn set_users(&self, users: Vec<DirectoryUser>) {
        {
            let mut inner = self.lock();
            inner.users = Some(Stamped::new(users));
        }
        self.notify(StoreEvent::UsersChanged);
    }

    /// Update one user's presence, if the directory is loaded
    pub fn apply_presence(&self, user_id: &str, presence: Presence) -> bool {
        let updated = {
            let mut inner = self.lock();
            inner
                .users
                .as_mut()
                .and_then(|entry| entry.value.iter_mut().find(|u| u.id == user_id))
                .map(|user| {
                    user.presence = presence;
                    true
                })
                .unwrap_or(false)
        };

        if updated {
            self.notify(StoreEvent::UsersChanged);
        }
        updated
    }

    // --- typing ---

    /// Record that a user is typing in a chat until `expires_at`
    pub fn set_typing(&self, chat_id: &str, user_id: &str, expires_at: Instant) {
        {
            let mut inner = self.lock();
            inner
                .typing
                .entry(chat_id.to_string())
                .or_default()
                .insert(user_id.to_string(), expires_at);
        }
        self.notify(StoreEvent::TypingChanged {
            chat_id: chat_id.to_string(),
        });
    }

    /// Remove a user's typing entry for a chat
    pub fn clear_typing(&self, chat_id: &str, user_id: &str) {
        let removed = {
            let mut inner = self.lock();
            inner
                .typing
                .get_mut(chat_id)
                .map(|users| users.remove(user_id).is_some())
                .unwrap_or(false)
        };

        if removed {
            self.notify(StoreEvent::TypingChanged {
                chat_id: chat_id.to_string(),
            });
        }
    }

    /// Users currently typing in a chat.
    ///
    /// Expired entries are swept lazily on read, so a peer that
    /// disconnected mid-type never leaves a permanent indicator.
    pub fn typing_users(&self, chat_id: &str) -> Vec<String> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.typing.get_mut(chat_id) {
            Some(users) => {
                users.retain(|_, expires_at| *expires_at > now);
                let mut ids: Vec<String> = users.keys().cloned().collect();
                ids.sort();
                ids
            }
            None => Vec::new(),
        }
    }

    // --- invalidation ---

    /// Clear one kind of cached data
    pub fn invalidate(&self, kind: CacheKind) {
        {
            let mut inner = self.lock();
            match kind {
                CacheKind::Chats => inner.chats = None,
                CacheKind::Messages => inner.messages.clear(),
                CacheKind::Users => inner.users = None,
            }
        }
        match kind {
            CacheKind::Chats => self.notify(StoreEvent::ChatsChanged),
            CacheKind::Messages => {}
            CacheKind::Users => self.notify(StoreEvent::UsersChanged),
        }
    }

    /// Clear the whole store, typing state included
    pub fn invalidate_all(&self) {
        {
            let mut inner = self.lock();
            inner.chats = None;
            inner.messages.clear();
            inner.users = None;
            inner.typing.clear();
        }
        self.notify(StoreEvent::ChatsChanged);
        self.notify(StoreEvent::UsersChanged);
    }
}

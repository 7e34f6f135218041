//! Chat synchronization engine facade
//!
//! [`ChatSyncEngine`] wires the cache store, retry executor, REST client,
//! realtime reconciler, typing coordinator, and unread accounting behind
//! one surface. The API and channel are injected as trait objects with an
//! explicit `new`/`destroy` lifecycle, so tests substitute fakes and no
//! ambient singleton exists.
//!
//! The UI layer reads reactively (cached snapshots, store events, the
//! connection watch) and drives imperative operations (`load_*`,
//! `send_message`, `mark_chat_as_read`, ...) from user intent.

use crate::api::ChatApi;
use crate::config::SyncConfig;
use crate::outbox;
use crate::realtime::{
    ConnectionState, ConnectionTracker, RealtimeChannel, reconciler, spawn_supervisor,
};
use crate::retry;
use crate::store::{CacheStore, Chat, ChatMessage, DirectoryUser, StoreEvent};
use crate::typing::TypingCoordinator;
use crate::unread;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// In-flight fetch counter that decrements on drop
struct LoadGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The chat synchronization engine
///
/// # Example
/// ```rust,no_run
/// use chatsync::api::HttpChatApi;
/// use chatsync::config::SyncConfig;
/// use chatsync::engine::ChatSyncEngine;
/// use chatsync::realtime::LoopbackChannel;
/// use std::sync::Arc;
///
/// # async fn example() -> chatsync::Result<()> {
/// let config = SyncConfig::new("https://api.example.com", "user-1", "Alice");
/// let api = Arc::new(HttpChatApi::new(&config)?);
/// let channel = Arc::new(LoopbackChannel::new());
/// let engine = ChatSyncEngine::new(config, api, channel);
///
/// engine.subscribe_chat("chat-1").await?;
/// let chats = engine.load_chats(false).await?;
/// println!("{} chats, {} unread", chats.len(), engine.total_unread_count());
///
/// engine.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatSyncEngine {
    config: SyncConfig,
    store: Arc<CacheStore>,
    api: Arc<dyn ChatApi>,
    channel: Arc<dyn RealtimeChannel>,
    typing: TypingCoordinator,
    connection: Arc<ConnectionTracker>,
    reconcilers: Mutex<HashMap<String, JoinHandle<()>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<String>>,
    destroyed: AtomicBool,
}

impl ChatSyncEngine {
    /// Create an engine over the given API and channel implementations.
    ///
    /// Spawns the connection supervisor; call
    /// [`ChatSyncEngine::destroy`] to release it and every channel
    /// resource.
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn ChatApi>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> Self {
        let store = Arc::new(CacheStore::new(config.cache_ttl));
        let typing = TypingCoordinator::new(channel.clone(), config.typing_debounce);
        let connection = Arc::new(ConnectionTracker::new());
        let supervisor =
            spawn_supervisor(connection.clone(), channel.signals(), config.reconnect);

        Self {
            config,
            store,
            api,
            channel,
            typing,
            connection,
            reconcilers: Mutex::new(HashMap::new()),
            supervisor: Mutex::new(Some(supervisor)),
            in_flight: AtomicUsize::new(0),
            last_error: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(Error::Validation("engine is destroyed".to_string()))
        } else {
            Ok(())
        }
    }

    fn begin_load(&self) -> LoadGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        LoadGuard {
            counter: &self.in_flight,
        }
    }

    fn record_error(&self, e: &Error) {
        let mut last_error = self.last_error.lock().expect("lock poisoned");
        *last_error = Some(e.to_string());
    }

    fn clear_error(&self) {
        let mut last_error = self.last_error.lock().expect("lock poisoned");
        *last_error = None;
    }

    // --- loading ---

    /// Load the chat list, from cache when fresh unless `force`.
    pub async fn load_chats(&self, force: bool) -> Result<Vec<Chat>> {
        self.ensure_active()?;

        if !force {
            if let Some(chats) = self.store.get_chats() {
                debug!("Chat list served from cache");
                return Ok(chats);
            }
        }

        let _guard = self.begin_load();
        match retry::run(&self.config.retry, || self.api.list_chats()).await {
            Ok(chats) => {
                if self.destroyed.load(Ordering::SeqCst) {
                    debug!("Engine destroyed mid-fetch, dropping chat list");
                    return Ok(chats);
                }
                self.store.set_chats(chats.clone());
                self.clear_error();
                Ok(chats)
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Load a page of messages for a chat, from cache when fresh unless
    /// `force`. REST backfill merges with whatever realtime and optimistic
    /// writes already placed in the store.
    pub async fn load_messages(&self, chat_id: &str, force: bool) -> Result<Vec<ChatMessage>> {
        self.ensure_active()?;

        if !force {
            if let Some(messages) = self.store.get_messages(chat_id) {
                debug!("Messages for chat {} served from cache", chat_id);
                return Ok(messages);
            }
        }

        let _guard = self.begin_load();
        let fetched = retry::run(&self.config.retry, || {
            self.api
                .fetch_messages(chat_id, self.config.message_page_size, None)
        })
        .await;

        match fetched {
            Ok(messages) => {
                if self.destroyed.load(Ordering::SeqCst) {
                    debug!("Engine destroyed mid-fetch, dropping messages");
                    return Ok(messages);
                }
                let merged = self.store.merge_messages(chat_id, messages);
                self.store.recompute_unread(chat_id);
                self.clear_error();
                Ok(merged)
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Load directory users, chat-scoped when `chat_id` is given, falling
    /// back to the general directory endpoint if the scoped call fails.
    pub async fn load_users(&self, chat_id: Option<&str>) -> Result<Vec<DirectoryUser>> {
        self.ensure_active()?;

        if let Some(users) = self.store.get_users() {
            debug!("Directory served from cache");
            return Ok(users);
        }

        let _guard = self.begin_load();
        let fetched = match chat_id {
            Some(chat_id) => {
                match retry::run(&self.config.retry, || self.api.fetch_chat_users(chat_id)).await
                {
                    Ok(users) => Ok(users),
                    Err(e) => {
                        warn!(
                            "Chat-scoped directory fetch failed ({}), falling back to general directory",
                            e
                        );
                        retry::run(&self.config.retry, || self.api.fetch_directory()).await
                    }
                }
            }
            None => retry::run(&self.config.retry, || self.api.fetch_directory()).await,
        };

        match fetched {
            Ok(users) => {
                if self.destroyed.load(Ordering::SeqCst) {
                    debug!("Engine destroyed mid-fetch, dropping directory");
                    return Ok(users);
                }
                self.store.set_users(users.clone());
                self.clear_error();
                Ok(users)
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Create (or fetch) the direct-message chat with a peer user
    pub async fn create_or_get_dm(&self, peer_user_id: &str) -> Result<Chat> {
        self.ensure_active()?;

        let chat = retry::run(&self.config.retry, || self.api.create_dm(peer_user_id))
            .await
            .inspect_err(|e| self.record_error(e))?;

        self.store.upsert_chat(chat.clone());
        Ok(chat)
    }

    // --- sending ---

    /// Send a message optimistically; see [`crate::outbox::send_message`]
    pub async fn send_message(&self, chat_id: &str, body: &str) -> Result<ChatMessage> {
        self.ensure_active()?;

        // Sending ends the local typing burst.
        if let Err(e) = self.typing.stop_typing(chat_id).await {
            debug!("Could not publish typing stop before send: {}", e);
        }

        outbox::send_message(
            &self.store,
            self.channel.as_ref(),
            &self.config.retry,
            &self.config.user_id,
            &self.config.user_name,
            chat_id,
            body,
        )
        .await
        .inspect_err(|e| self.record_error(e))
    }

    /// Re-dispatch a failed message without duplicating it
    pub async fn retry_message(&self, chat_id: &str, message_id: &str) -> Result<ChatMessage> {
        self.ensure_active()?;

        outbox::retry_message(
            &self.store,
            self.channel.as_ref(),
            &self.config.retry,
            chat_id,
            message_id,
        )
        .await
        .inspect_err(|e| self.record_error(e))
    }

    // --- read state ---

    /// Mark a chat as read. Explicit by design: call it from an
    /// actively-reading context, not from merely opening the history view.
    pub async fn mark_chat_as_read(&self, chat_id: &str) -> Result<()> {
        self.ensure_active()?;

        unread::mark_chat_as_read(&self.store, self.api.as_ref(), &self.config.retry, chat_id)
            .await
            .inspect_err(|e| self.record_error(e))
    }

    /// Total unread count across all chats; pure over cache state
    pub fn total_unread_count(&self) -> u32 {
        unread::total_unread_count(&self.store)
    }

    // --- typing ---

    /// Record local keystroke activity in a chat
    pub async fn start_typing(&self, chat_id: &str) -> Result<()> {
        self.ensure_active()?;
        self.typing.start_typing(chat_id).await
    }

    /// End the local typing burst in a chat
    pub async fn stop_typing(&self, chat_id: &str) -> Result<()> {
        self.typing.stop_typing(chat_id).await
    }

    /// Users currently typing in a chat (expired entries swept)
    pub fn typing_users(&self, chat_id: &str) -> Vec<String> {
        self.store.typing_users(chat_id)
    }

    // --- realtime subscription ---

    /// Subscribe to a chat's realtime events. Idempotent: subscribing to
    /// an already-subscribed chat is a no-op.
    pub async fn subscribe_chat(&self, chat_id: &str) -> Result<()> {
        self.ensure_active()?;

        {
            let reconcilers = self.reconcilers.lock().expect("lock poisoned");
            if reconcilers.contains_key(chat_id) {
                debug!("Already subscribed to chat {}", chat_id);
                return Ok(());
            }
        }

        // First subscription from cold starts the connection lifecycle.
        self.connection.transition(ConnectionState::Connecting);

        let events = self.channel.subscribe(chat_id).await?;
        let handle = reconciler::spawn(
            self.store.clone(),
            chat_id.to_string(),
            self.config.user_id.clone(),
            self.config.typing_expiry,
            events,
        );

        let mut reconcilers = self.reconcilers.lock().expect("lock poisoned");
        if reconcilers.contains_key(chat_id) {
            // Lost a subscribe race; keep the first reconciler.
            handle.abort();
        } else {
            reconcilers.insert(chat_id.to_string(), handle);
        }
        Ok(())
    }

    /// Unsubscribe from a chat, stopping its reconciler immediately and
    /// releasing the underlying channel resource
    pub async fn unsubscribe_chat(&self, chat_id: &str) -> Result<()> {
        let handle = {
            let mut reconcilers = self.reconcilers.lock().expect("lock poisoned");
            reconcilers.remove(chat_id)
        };

        match handle {
            Some(handle) => {
                handle.abort();
                self.channel.unsubscribe(chat_id).await?;
                info!("Unsubscribed from chat {}", chat_id);
            }
            None => debug!("Chat {} was not subscribed", chat_id),
        }
        Ok(())
    }

    // --- reactive reads ---

    /// Cached chat list, staleness-tolerant
    pub fn chats(&self) -> Option<Vec<Chat>> {
        self.store.peek_chats()
    }

    /// Cached message list for a chat, staleness-tolerant
    pub fn messages(&self, chat_id: &str) -> Option<Vec<ChatMessage>> {
        self.store.peek_messages(chat_id)
    }

    /// Cached directory, staleness-tolerant
    pub fn users(&self) -> Option<Vec<DirectoryUser>> {
        self.store.peek_users()
    }

    /// Subscribe to store change events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Watch connection state transitions
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch()
    }

    /// Whether any fetch is in flight
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// The most recent surfaced error, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("lock poisoned").clone()
    }

    // --- cache control ---

    /// Drop every cached entry (messages, chats, directory, typing)
    pub fn clear_cache(&self) {
        self.store.invalidate_all();
    }

    /// Drop the cache and reload the chat list regardless of TTL
    pub async fn force_refresh(&self) -> Result<Vec<Chat>> {
        self.clear_cache();
        self.load_chats(true).await
    }

    // --- lifecycle ---

    /// Tear the engine down: stop reconcilers and the supervisor, release
    /// channel resources, and disconnect. Results of still-in-flight REST
    /// calls are dropped. Idempotent.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Destroying chat sync engine");

        self.typing.shutdown();

        let handles: Vec<JoinHandle<()>> = {
            let mut reconcilers = self.reconcilers.lock().expect("lock poisoned");
            reconcilers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.abort();
        }

        if let Some(handle) = self.supervisor.lock().expect("lock poisoned").take() {
            handle.abort();
        }

        if let Err(e) = self.channel.destroy().await {
            warn!("Channel teardown reported: {}", e);
        }
        self.connection.transition(ConnectionState::Disconnected);
    }
}

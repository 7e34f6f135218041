//! Shared fakes and helpers for engine-level tests

use crate::api::ChatApi;
use crate::config::SyncConfig;
use crate::realtime::{ChannelSignal, OutgoingMessage, RealtimeChannel, RealtimeEvent};
use crate::retry::RetryPolicy;
use crate::store::{Chat, ChatKind, ChatMessage, DeliveryStatus, DirectoryUser};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Config with fast retries for paused-clock tests
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::new("http://127.0.0.1:1", "me", "Me");
    config.retry = RetryPolicy::new(1, Duration::from_millis(5), Duration::from_millis(50));
    config.reconnect = RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(50));
    config
}

/// A chat as the fake backend would serve it
pub fn backend_chat(id: &str, name: &str, unread: u32) -> Chat {
    let mut chat = Chat::new(id.to_string(), name.to_string(), ChatKind::Group);
    chat.unread_count = unread;
    chat
}

/// A peer-authored message as the fake backend would serve it
pub fn backend_message(id: &str, chat_id: &str, at: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        client_id: None,
        chat_id: chat_id.to_string(),
        sender_id: "peer".to_string(),
        sender_name: "Peer".to_string(),
        body: format!("body of {}", id),
        created_at: at,
        status: DeliveryStatus::Delivered,
        is_own: false,
    }
}

/// Scripted in-memory [`ChatApi`] with per-endpoint call counters
#[derive(Default)]
pub struct FakeChatApi {
    pub chats: Mutex<Vec<Chat>>,
    pub messages: Mutex<Vec<ChatMessage>>,
    pub users: Mutex<Vec<DirectoryUser>>,
    pub list_chats_calls: AtomicUsize,
    pub fetch_messages_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub directory_calls: AtomicUsize,
    pub fail_list_chats: AtomicBool,
    pub fail_chat_users: AtomicBool,
    pub fail_mark_read: AtomicBool,
}

impl FakeChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(chats: Vec<Chat>) -> Self {
        let api = Self::new();
        *api.chats.lock().expect("lock poisoned") = chats;
        api
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn list_chats(&self) -> Result<Vec<Chat>> {
        self.list_chats_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_chats.load(Ordering::SeqCst) {
            return Err(Error::Api("injected list failure".to_string()));
        }
        Ok(self.chats.lock().expect("lock poisoned").clone())
    }

    async fn fetch_messages(
        &self,
        chat_id: &str,
        _limit: u32,
        _before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>> {
        self.fetch_messages_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn create_dm(&self, peer_user_id: &str) -> Result<Chat> {
        let chat = Chat::new(
            format!("dm-{}", peer_user_id),
            peer_user_id.to_string(),
            ChatKind::Direct,
        );
        self.chats.lock().expect("lock poisoned").push(chat.clone());
        Ok(chat)
    }

    async fn mark_read(&self, _chat_id: &str) -> Result<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(Error::Api("injected mark-read failure".to_string()));
        }
        Ok(())
    }

    async fn fetch_chat_users(&self, _chat_id: &str) -> Result<Vec<DirectoryUser>> {
        if self.fail_chat_users.load(Ordering::SeqCst) {
            return Err(Error::Api("injected chat-users failure".to_string()));
        }
        Ok(self.users.lock().expect("lock poisoned").clone())
    }

    async fn fetch_directory(&self) -> Result<Vec<DirectoryUser>> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().expect("lock poisoned").clone())
    }
}

/// Channel fake that records typing announcements
pub struct RecordingChannel {
    typing_calls: Mutex<Vec<(String, bool)>>,
    signals: broadcast::Sender<ChannelSignal>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            typing_calls: Mutex::new(Vec::new()),
            signals,
        }
    }

    pub fn typing_calls(&self) -> Vec<(String, bool)> {
        self.typing_calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl RealtimeChannel for RecordingChannel {
    async fn subscribe(&self, _chat_id: &str) -> Result<mpsc::Receiver<RealtimeEvent>> {
        let (_tx, rx) = mpsc::channel(8);
        Ok(rx)
    }

    async fn unsubscribe(&self, _chat_id: &str) -> Result<()> {
        Ok(())
    }

    async fn send(&self, chat_id: &str, outgoing: OutgoingMessage) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: format!("srv-{}", outgoing.client_id),
            client_id: Some(outgoing.client_id),
            chat_id: chat_id.to_string(),
            sender_id: outgoing.sender_id,
            sender_name: outgoing.sender_name,
            body: outgoing.body,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            is_own: true,
        })
    }

    async fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<()> {
        self.typing_calls
            .lock()
            .expect("lock poisoned")
            .push((chat_id.to_string(), is_typing));
        Ok(())
    }

    fn signals(&self) -> broadcast::Receiver<ChannelSignal> {
        self.signals.subscribe()
    }

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

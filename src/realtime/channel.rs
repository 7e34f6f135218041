//! Injectable realtime channel seam
//!
//! The engine consumes the channel through the [`RealtimeChannel`] trait so
//! the transport stays a process-scoped service with an explicit lifecycle,
//! never an ambient singleton. [`LoopbackChannel`] is an in-process
//! implementation that echoes published messages back as events; it backs
//! the test suite and local development.

use crate::realtime::event::{ChannelSignal, OutgoingMessage, RealtimeEvent};
use crate::store::{ChatMessage, DeliveryStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Capacity of each per-chat event stream
const EVENT_STREAM_CAPACITY: usize = 64;

/// Realtime channel operations the engine consumes
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Open the event stream for a chat. The receiver yields every push
    /// event for that chat until [`RealtimeChannel::unsubscribe`] or
    /// [`RealtimeChannel::destroy`].
    async fn subscribe(&self, chat_id: &str) -> Result<mpsc::Receiver<RealtimeEvent>>;

    /// Release the channel resource for a chat
    async fn unsubscribe(&self, chat_id: &str) -> Result<()>;

    /// Publish a message and return the created-message acknowledgment
    async fn send(&self, chat_id: &str, outgoing: OutgoingMessage) -> Result<ChatMessage>;

    /// Announce that the local user started or stopped typing
    async fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<()>;

    /// Subscribe to transport lifecycle signals
    fn signals(&self) -> broadcast::Receiver<ChannelSignal>;

    /// Release all channel resources
    async fn destroy(&self) -> Result<()>;
}

/// In-process channel that echoes published messages back to subscribers.
///
/// `set_online(false)` simulates a dead link: sends fail and a
/// [`ChannelSignal::ChannelError`] is emitted, which drives the connection
/// state machine exactly like a real transport outage.
pub struct LoopbackChannel {
    subscribers: Mutex<HashMap<String, mpsc::Sender<RealtimeEvent>>>,
    signals: broadcast::Sender<ChannelSignal>,
    online: AtomicBool,
}

impl LoopbackChannel {
    /// Create a channel in the online state
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            subscribers: Mutex::new(HashMap::new()),
            signals,
            online: AtomicBool::new(true),
        }
    }

    /// Simulate the link going up or down
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        let signal = if online {
            ChannelSignal::Open
        } else {
            ChannelSignal::ChannelError("link down".to_string())
        };
        let _ = self.signals.send(signal);
    }

    /// Deliver an event to a chat's subscriber, as a remote peer would.
    ///
    /// Returns whether a subscriber existed; events for unsubscribed chats
    /// are dropped.
    pub fn emit(&self, chat_id: &str, event: RealtimeEvent) -> bool {
        let subscribers = self.subscribers.lock().expect("lock poisoned");
        match subscribers.get(chat_id) {
            Some(sender) => match sender.try_send(event) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping event for chat {}: {}", chat_id, e);
                    false
                }
            },
            None => {
                debug!("No subscriber for chat {}, event dropped", chat_id);
                false
            }
        }
    }

    /// Emit a raw transport signal
    pub fn emit_signal(&self, signal: ChannelSignal) {
        let _ = self.signals.send(signal);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Realtime("channel offline".to_string()))
        }
    }
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeChannel for LoopbackChannel {
    async fn subscribe(&self, chat_id: &str) -> Result<mpsc::Receiver<RealtimeEvent>> {
        let (sender, receiver) = mpsc::channel(EVENT_STREAM_CAPACITY);
        {
            let mut subscribers = self.subscribers.lock().expect("lock poisoned");
            subscribers.insert(chat_id.to_string(), sender);
        }
        info!("Subscribed to chat {}", chat_id);

        if self.online.load(Ordering::SeqCst) {
            let _ = self.signals.send(ChannelSignal::Open);
        }
        Ok(receiver)
    }

    async fn unsubscribe(&self, chat_id: &str) -> Result<()> {
        let removed = {
            let mut subscribers = self.subscribers.lock().expect("lock poisoned");
            subscribers.remove(chat_id).is_some()
        };
        if removed {
            info!("Unsubscribed from chat {}", chat_id);
        }
        Ok(())
    }

    async fn send(&self, chat_id: &str, outgoing: OutgoingMessage) -> Result<ChatMessage> {
        self.ensure_online()?;

        let ack = ChatMessage {
            id: format!("srv-{}", uuid::Uuid::new_v4()),
            client_id: Some(outgoing.client_id),
            chat_id: chat_id.to_string(),
            sender_id: outgoing.sender_id,
            sender_name: outgoing.sender_name,
            body: outgoing.body,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            is_own: true,
        };

        // Echo the created message back as a push event, like a server
        // broadcasting to the chat's subscribers.
        self.emit(chat_id, RealtimeEvent::MessageCreated(ack.clone()));

        Ok(ack)
    }

    async fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<()> {
        self.ensure_online()?;
        debug!("Typing indicator for chat {}: {}", chat_id, is_typing);
        Ok(())
    }

    fn signals(&self) -> broadcast::Receiver<ChannelSignal> {
        self.signals.subscribe()
    }

    async fn destroy(&self) -> Result<()> {
        {
            let mut subscribers = self.subscribers.lock().expect("lock poisoned");
            subscribers.clear();
        }
        self.online.store(false, Ordering::SeqCst);
        info!("Loopback channel destroyed");
        Ok(())
    }
}

//! Typing indicator coordination
//!
//! Local side: keystroke bursts are debounced into a single start signal
//! per burst, with an inactivity timer that fires the stop signal. The
//! debounce window is held as explicit state (armed flag plus timer
//! handle), one entry per chat.
//!
//! Remote side: received typing signals live in the store's typing map
//! with an expiry, swept lazily on read, so a peer that disconnects
//! mid-type never leaves a permanent indicator.

use crate::Result;
use crate::realtime::RealtimeChannel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Debounce state for one chat
struct LocalTyping {
    /// Whether the start signal for the current burst went out
    announced: bool,
    /// Inactivity timer for the current burst
    timer: Option<JoinHandle<()>>,
}

/// Debounces local keystrokes into start/stop typing signals
pub struct TypingCoordinator {
    channel: Arc<dyn RealtimeChannel>,
    debounce: Duration,
    local: Arc<Mutex<HashMap<String, LocalTyping>>>,
}

impl TypingCoordinator {
    /// Create a coordinator publishing through `channel`
    pub fn new(channel: Arc<dyn RealtimeChannel>, debounce: Duration) -> Self {
        Self {
            channel,
            debounce,
            local: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record keystroke activity in a chat.
    ///
    /// The first call of a burst publishes the start signal; every call
    /// re-arms the inactivity timer. When the timer fires without further
    /// activity, the stop signal goes out.
    pub async fn start_typing(&self, chat_id: &str) -> Result<()> {
        let needs_announce = {
            let mut local = self.local.lock().expect("lock poisoned");
            let entry = local.entry(chat_id.to_string()).or_insert(LocalTyping {
                announced: false,
                timer: None,
            });
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            let needs = !entry.announced;
            entry.announced = true;
            needs
        };

        if needs_announce {
            if let Err(e) = self.channel.send_typing(chat_id, true).await {
                // Burst not announced after all; the next keystroke retries.
                let mut local = self.local.lock().expect("lock poisoned");
                if let Some(entry) = local.get_mut(chat_id) {
                    entry.announced = false;
                }
                return Err(e);
            }
            debug!("Announced typing in chat {}", chat_id);
        }

        self.arm_timer(chat_id);
        Ok(())
    }

    /// End the current burst, publishing the stop signal if one went out.
    ///
    /// Called on the inactivity timer, and directly when a message is sent.
    pub async fn stop_typing(&self, chat_id: &str) -> Result<()> {
        let was_announced = {
            let mut local = self.local.lock().expect("lock poisoned");
            match local.get_mut(chat_id) {
                Some(entry) => {
                    if let Some(timer) = entry.timer.take() {
                        timer.abort();
                    }
                    let was = entry.announced;
                    entry.announced = false;
                    was
                }
                None => false,
            }
        };

        if was_announced {
            self.channel.send_typing(chat_id, false).await?;
            debug!("Stopped typing in chat {}", chat_id);
        }
        Ok(())
    }

    /// Abort every pending inactivity timer (engine teardown)
    pub fn shutdown(&self) {
        let mut local = self.local.lock().expect("lock poisoned");
        for entry in local.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
        local.clear();
    }

    fn arm_timer(&self, chat_id: &str) {
        let channel = self.channel.clone();
        let local = self.local.clone();
        let chat = chat_id.to_string();
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let was_announced = {
                let mut map = local.lock().expect("lock poisoned");
                match map.get_mut(&chat) {
                    Some(entry) => {
                        let was = entry.announced;
                        entry.announced = false;
                        entry.timer = None;
                        was
                    }
                    None => false,
                }
            };

            if was_announced {
                if let Err(e) = channel.send_typing(&chat, false).await {
                    debug!("Failed to publish typing stop for {}: {}", chat, e);
                }
            }
        });

        let mut local = self.local.lock().expect("lock poisoned");
        if let Some(entry) = local.get_mut(chat_id) {
            entry.timer = Some(handle);
        } else {
            handle.abort();
        }
    }
}

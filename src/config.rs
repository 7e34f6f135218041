//! Engine configuration
//!
//! Central place for the tunables the synchronization core depends on:
//! cache time-to-live per kind, retry/backoff policy, typing windows,
//! reconnection policy, and the REST endpoint settings.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Per-kind cache time-to-live settings
///
/// Staleness is advisory: a reader past the TTL sees "absent" and is
/// expected to refresh, but a forced refresh may ignore the TTL entirely.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtl {
    /// TTL for the chat list
    pub chats: Duration,
    /// TTL for per-chat message pages
    pub messages: Duration,
    /// TTL for the user directory
    pub users: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            chats: Duration::from_secs(60),
            messages: Duration::from_secs(15),
            users: Duration::from_secs(300),
        }
    }
}

/// Configuration for the chat synchronization engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST backend (e.g., "https://api.example.com")
    pub base_url: String,
    /// Per-request timeout for REST calls
    pub request_timeout: Duration,
    /// Identifier of the current viewer; drives `is_own` and unread counting
    pub user_id: String,
    /// Display name of the current viewer, attached to optimistic messages
    pub user_name: String,
    /// Cache time-to-live per kind
    pub cache_ttl: CacheTtl,
    /// Retry/backoff policy for REST calls and message sends
    pub retry: RetryPolicy,
    /// Retry/backoff policy for realtime reconnection attempts
    pub reconnect: RetryPolicy,
    /// Inactivity window after which a local typing burst is considered over
    pub typing_debounce: Duration,
    /// How long a remote typing signal stays alive without a refresh
    pub typing_expiry: Duration,
    /// Default page size for message history fetches
    pub message_page_size: u32,
}

impl SyncConfig {
    /// Create a configuration for the given backend and viewer
    pub fn new(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    /// Set the retry policy for REST calls and sends
    pub fn set_retry(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Set the cache TTLs
    pub fn set_cache_ttl(&mut self, ttl: CacheTtl) {
        self.cache_ttl = ttl;
    }

    /// Set the local typing debounce window
    pub fn set_typing_debounce(&mut self, window: Duration) {
        self.typing_debounce = window;
    }

    /// Set the remote typing expiry window
    pub fn set_typing_expiry(&mut self, window: Duration) {
        self.typing_expiry = window;
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(10),
            user_id: String::new(),
            user_name: String::new(),
            cache_ttl: CacheTtl::default(),
            retry: RetryPolicy::default(),
            reconnect: RetryPolicy::default(),
            typing_debounce: Duration::from_secs(2),
            typing_expiry: Duration::from_secs(5),
            message_page_size: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let ttl = CacheTtl::default();
        assert_eq!(ttl.chats, Duration::from_secs(60));
        assert!(ttl.messages < ttl.chats);
    }

    #[test]
    fn test_new_fills_identity() {
        let config = SyncConfig::new("https://api.test", "u1", "Alice");
        assert_eq!(config.base_url, "https://api.test");
        assert_eq!(config.user_id, "u1");
        assert_eq!(config.user_name, "Alice");
        assert_eq!(config.typing_debounce, Duration::from_secs(2));
    }

    #[test]
    fn test_setters() {
        let mut config = SyncConfig::default();
        config.set_typing_expiry(Duration::from_secs(9));
        assert_eq!(config.typing_expiry, Duration::from_secs(9));
    }
}

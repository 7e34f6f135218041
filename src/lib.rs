//! ChatSync - a client-side chat synchronization core
//!
//! This library keeps a client's view of conversations, messages, typing
//! state, and unread counts consistent across three independent sources:
//! periodic REST fetches, a push/subscribe realtime channel, and
//! locally-originated (optimistic) writes.
//!
//! All state flows through a single in-memory [`store::CacheStore`]; the
//! REST layer and the realtime reconciler both write into it, and the UI
//! layer observes it through change events. Network operations are wrapped
//! in bounded retries with exponential backoff.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod engine;
pub mod outbox;
pub mod realtime;
pub mod retry;
pub mod store;
pub mod typing;
pub mod unread;

#[cfg(test)]
mod tests;

/// Result type alias for ChatSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ChatSync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Upstream API failure (server error, unreachable endpoint)
    #[error("API error: {0}")]
    Api(String),

    /// Request exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Realtime channel failure (subscribe, publish, teardown)
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Caller-supplied input rejected before any network I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server refused the operation for this user
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Cache store operation error
    #[error("Cache error: {0}")]
    Cache(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this failure is worth retrying.
    ///
    /// Only network/timeout-class failures qualify; permission and
    /// validation errors are final no matter how often they are retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api(_) | Error::Timeout(_) | Error::Realtime(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Validation(_)
            | Error::Permission(_)
            | Error::Cache(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Initialize the ChatSync library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

//! In-memory state for the synchronization core
//!
//! This module owns the domain types and the cache store including:
//! - `chat` - Chat conversation metadata and unread counts
//! - `message` - Message structures and delivery status
//! - `user` - Directory entries and presence
//! - `cache` - Time-boxed cache store with merge/dedup and change events
//!
//! The cache store is the single mutable resource of the engine: REST
//! fetches, the realtime reconciler, and the optimistic send pipeline all
//! write through it, never around it.

// Submodules
pub mod cache;
pub mod chat;
pub mod message;
pub mod user;

// Re-export commonly used types
pub use cache::{CacheKind, CacheStore, StoreEvent};
pub use chat::{Chat, ChatKind};
pub use message::{ChatMessage, DeliveryStatus};
pub use user::{DirectoryUser, Presence};

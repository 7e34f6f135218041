//! Realtime channel consumption
//!
//! This module handles the push/subscribe side of synchronization:
//! - `event` - Event and signal types delivered by the channel transport
//! - `channel` - The injectable channel seam and an in-process loopback
//! - `connection` - Channel lifecycle state machine and its supervisor
//! - `reconciler` - Folds incoming events into the cache store

// Submodules
pub mod channel;
pub mod connection;
pub mod event;
pub mod reconciler;

// Re-export commonly used types
pub use channel::{LoopbackChannel, RealtimeChannel};
pub use connection::{ConnectionState, ConnectionTracker, spawn_supervisor};
pub use event::{ChannelSignal, OutgoingMessage, RealtimeEvent};

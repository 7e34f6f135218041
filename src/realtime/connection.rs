//! Connection lifecycle state machine
//!
//! Tracks the realtime channel through `disconnected` → `connecting` →
//! `connected`, degrading when the transport reports trouble and driving
//! reconnection with the shared backoff policy. Observers watch the state
//! through a `tokio::sync::watch` channel and are notified on every
//! transition.

use crate::realtime::event::ChannelSignal;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a reconnection attempt waits for the channel-open
/// acknowledgment before backing off again
const OPEN_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state, and terminal on explicit teardown
    Disconnected,
    /// Subscription or reconnection attempt in progress
    Connecting,
    /// Channel open and delivering events
    Connected,
    /// Connected but missed events suspected; reconnection pending
    Degraded,
}

/// Whether the state machine admits the edge `from` → `to`.
///
/// Explicit teardown is allowed from anywhere; everything else follows the
/// lifecycle: first subscribe starts connecting, the open acknowledgment
/// connects, transport trouble degrades, and a degraded channel retries.
fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    matches!(
        (from, to),
        (_, Disconnected)
            | (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connecting, Degraded)
            | (Connected, Degraded)
            | (Degraded, Connecting)
            | (Degraded, Connected)
    )
}

/// Observable connection state with transition validation
pub struct ConnectionTracker {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    /// Create a tracker in the disconnected state
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Watch state changes; the receiver sees every transition
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Attempt a transition; invalid or redundant edges are ignored.
    ///
    /// Returns whether the state actually changed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let current = *self.tx.borrow();
        if current == next {
            return false;
        }
        if !is_valid_transition(current, next) {
            debug!(
                "Ignoring invalid connection transition {:?} -> {:?}",
                current, next
            );
            return false;
        }

        info!("Connection state: {:?} -> {:?}", current, next);
        self.tx.send_replace(next);
        true
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the supervisor task that folds transport signals into the tracker
/// and drives reconnection.
///
/// On trouble the channel degrades, waits out a backoff delay, and moves to
/// connecting; if no open acknowledgment arrives within the ack window the
/// cycle repeats with a longer delay. An open acknowledgment resets the
/// backoff. The task ends (disconnecting the tracker) when the signal
/// stream closes.
pub fn spawn_supervisor(
    tracker: Arc<ConnectionTracker>,
    mut signals: broadcast::Receiver<ChannelSignal>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempt: u32 = 0;

        loop {
            let received = if tracker.state() == ConnectionState::Connecting {
                match tokio::time::timeout(OPEN_ACK_TIMEOUT, signals.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        // No open ack in time; back off and try again.
                        tracker.transition(ConnectionState::Degraded);
                        let delay = policy.delay_for(attempt);
                        attempt = attempt.saturating_add(1);
                        warn!("No channel-open ack, retrying in {:?}", delay);
                        tokio::time::sleep(delay).await;
                        tracker.transition(ConnectionState::Connecting);
                        continue;
                    }
                }
            } else {
                signals.recv().await
            };

            match received {
                Ok(ChannelSignal::Open) => {
                    attempt = 0;
                    tracker.transition(ConnectionState::Connected);
                }
                Ok(signal) => {
                    if tracker.state() == ConnectionState::Disconnected {
                        debug!("Ignoring channel signal while disconnected: {:?}", signal);
                        continue;
                    }
                    warn!("Realtime channel trouble: {:?}", signal);
                    tracker.transition(ConnectionState::Degraded);

                    let delay = policy.delay_for(attempt);
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(delay).await;
                    tracker.transition(ConnectionState::Connecting);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Supervisor lagged, {} signals skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracker.transition(ConnectionState::Disconnected);
                    break;
                }
            }
        }
        debug!("Connection supervisor stopped");
    })
}

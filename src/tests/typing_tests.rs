//! Typing coordinator tests with a recording channel and a paused clock

use super::support::RecordingChannel;
use crate::typing::TypingCoordinator;
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_secs(2);

#[tokio::test(start_paused = true)]
async fn test_burst_announces_once() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.start_typing("c1").await.expect("first keystroke");
    typing.start_typing("c1").await.expect("second keystroke");
    typing.start_typing("c1").await.expect("third keystroke");

    assert_eq!(channel.typing_calls(), vec![("c1".to_string(), true)]);
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_fires_stop() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.start_typing("c1").await.expect("keystroke");
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(
        channel.typing_calls(),
        vec![("c1".to_string(), true), ("c1".to_string(), false)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_keystrokes_extend_the_window() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.start_typing("c1").await.expect("keystroke");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    typing.start_typing("c1").await.expect("keystroke re-arms");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Second timer is still pending; no stop yet.
    assert_eq!(channel.typing_calls().len(), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        channel.typing_calls(),
        vec![("c1".to_string(), true), ("c1".to_string(), false)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_explicit_stop_short_circuits_timer() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.start_typing("c1").await.expect("keystroke");
    typing.stop_typing("c1").await.expect("explicit stop");

    assert_eq!(
        channel.typing_calls(),
        vec![("c1".to_string(), true), ("c1".to_string(), false)]
    );

    // The aborted timer must not fire a second stop.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(channel.typing_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_burst_is_silent() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.stop_typing("c1").await.expect("stop");
    assert!(channel.typing_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_new_burst_after_stop_announces_again() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.start_typing("c1").await.expect("keystroke");
    typing.stop_typing("c1").await.expect("stop");
    typing.start_typing("c1").await.expect("new burst");

    assert_eq!(
        channel.typing_calls(),
        vec![
            ("c1".to_string(), true),
            ("c1".to_string(), false),
            ("c1".to_string(), true)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_bursts_are_tracked_per_chat() {
    let channel = Arc::new(RecordingChannel::new());
    let typing = TypingCoordinator::new(channel.clone(), DEBOUNCE);

    typing.start_typing("c1").await.expect("keystroke c1");
    typing.start_typing("c2").await.expect("keystroke c2");

    assert_eq!(
        channel.typing_calls(),
        vec![("c1".to_string(), true), ("c2".to_string(), true)]
    );
}

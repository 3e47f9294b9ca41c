//! Custom test assertions for integration tests

use jsoc_dl::{Event, ProgressTracker};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;

/// Wait for a tracker to finish, failing the test after `timeout`
pub async fn wait_complete(tracker: &ProgressTracker, timeout: Duration) {
    if tokio::time::timeout(timeout, tracker.wait(None)).await.is_err() {
        panic!(
            "tracker did not complete within {:?}: {}/{} done",
            timeout,
            tracker.completed(),
            tracker.requested()
        );
    }
}

/// Drain every event currently buffered on `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Assert that `path` exists with exactly `expected` as its content
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let content = std::fs::read(path)
        .unwrap_or_else(|e| panic!("expected {} to exist: {}", path.display(), e));
    assert_eq!(
        content,
        expected,
        "unexpected content in {}",
        path.display()
    );
}

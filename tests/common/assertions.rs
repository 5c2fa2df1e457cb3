//! Result plumbing for integration tests

use std::time::Duration;

use tokio::sync::mpsc;
use webimage_dl::{DownloadHandlers, DownloadResult};

/// Handlers forwarding the delivered result into a channel
pub fn capture_result() -> (DownloadHandlers, mpsc::UnboundedReceiver<DownloadResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = DownloadHandlers::new().on_complete(move |result, _url| {
        let _ = tx.send(result);
    });
    (handlers, rx)
}

/// Wait for the delivered result
///
/// # Panics
/// If nothing arrives within `timeout` or the handler was dropped undelivered.
pub async fn wait_for_result(
    rx: &mut mpsc::UnboundedReceiver<DownloadResult>,
    timeout: Duration,
) -> DownloadResult {
    tokio::time::timeout(timeout, rx.recv())
        .await
        .expect("timed out waiting for a download result")
        .expect("completion handler dropped without delivering")
}

/// Wait until the completion handler is dropped without being called
pub async fn wait_for_drop(rx: &mut mpsc::UnboundedReceiver<DownloadResult>, timeout: Duration) {
    let outcome = tokio::time::timeout(timeout, rx.recv())
        .await
        .expect("timed out waiting for the completion handler to be dropped");
    assert!(outcome.is_none(), "expected no delivery, got {:?}", outcome.map(|r| r.kind()));
}

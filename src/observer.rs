//! Downloader-wide observer

use bytes::Bytes;
use url::Url;

use crate::downloader::TaskHandle;
use crate::error::TransportError;
use crate::types::{Image, ResponseMetadata};

/// Long-lived listener notified of terminal events across all tasks
///
/// Every method has a no-op default. Apart from [`should_download`], all
/// callbacks run on the downloader's delivery queue, and always before the
/// task's own completion handler.
///
/// [`should_download`]: DownloadObserver::should_download
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use webimage_dl::{DownloadObserver, Image};
/// use bytes::Bytes;
/// use url::Url;
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl DownloadObserver for Counter {
///     fn on_decoded(&self, _image: &Image, _data: &Bytes, _url: &Url) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait DownloadObserver: Send + Sync {
    /// Pre-flight veto, consulted when the response metadata arrives
    ///
    /// Runs on the transport's delivery context. Returning `false` cancels the
    /// operation and the task terminates as cancelled.
    fn should_download(&self, _url: &Url, _response: &ResponseMetadata, _task: &TaskHandle) -> bool {
        true
    }

    /// The task was cancelled
    fn on_cancelled(&self, _url: &Url) {}

    /// The transport failed for a reason other than cancellation
    fn on_network_failed(&self, _url: &Url, _error: &TransportError) {}

    /// No image could be produced; `data` is `None` when nothing was received
    fn on_decode_failed(&self, _url: &Url, _data: Option<&Bytes>) {}

    /// An image was decoded (and transformed, if the task had a transform)
    fn on_decoded(&self, _image: &Image, _data: &Bytes, _url: &Url) {}
}

/// Observer that ignores every notification
pub struct NoOpObserver;

impl DownloadObserver for NoOpObserver {}

//! Completion state machine: terminal-event classification, the
//! decode/transform pipeline, and result delivery.
//!
//! ```text
//! terminal event ─┬─ cancellation error ──────────────► Cancelled
//!                 ├─ other error ─────────────────────► NetworkError
//!                 ├─ no error, no bytes ──────────────► MissingData
//!                 └─ no error, bytes ─► processing pool
//!                        check ─► decode ─┬─ ok ─► check ─► transform ─► check ─► Decoded
//!                                         └─ fail ─► check ─► UndecodableData
//! ```
//!
//! A check observing `Cancelling` short-circuits to `Cancelled`. Every path ends
//! in exactly one call to [`DownloaderCore::deliver`].
//!
//! The observer is captured when the terminal event arrives and travels with
//! the task. Teardown clearing the observer slot afterwards does not hide the
//! results of tasks that had already terminated.

use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use super::DownloaderCore;
use super::task::Task;
use crate::error::TransportError;
use crate::observer::DownloadObserver;
use crate::types::DownloadResult;

impl DownloaderCore {
    /// Classify a terminal event for a task already removed from the registry
    pub(crate) fn finish_downloading(self: &Arc<Self>, task: Task, error: Option<TransportError>) {
        let observer = self.observer();
        match error {
            Some(e) if e.is_cancellation() => {
                tracing::debug!(operation_id = task.id().get(), url = %task.url(), "Download cancelled");
                self.deliver(task, observer, DownloadResult::Cancelled);
            }
            Some(e) => {
                tracing::warn!(
                    operation_id = task.id().get(),
                    url = %task.url(),
                    error = %e,
                    "Download failed"
                );
                self.deliver(task, observer, DownloadResult::NetworkError(e));
            }
            None => {
                let received = task.received_len();
                match task.take_data() {
                    Some(data) => {
                        tracing::debug!(
                            operation_id = task.id().get(),
                            bytes = received,
                            "Download finished, scheduling processing"
                        );
                        let core = Arc::clone(self);
                        self.process_pool
                            .spawn(Box::new(move || core.process(task, observer, data)));
                    }
                    None => {
                        tracing::warn!(
                            operation_id = task.id().get(),
                            url = %task.url(),
                            "Download finished without data"
                        );
                        self.deliver(task, observer, DownloadResult::MissingData);
                    }
                }
            }
        }
    }

    /// Decode and transform on the processing pool
    ///
    /// Cancellation is polled between stages, never during one. Side effects a
    /// decode or transform handler performs before a late cancellation is seen
    /// are not undone.
    pub(crate) fn process(
        self: &Arc<Self>,
        task: Task,
        observer: Option<Arc<dyn DownloadObserver>>,
        data: Bytes,
    ) {
        if task.is_cancelling() {
            return self.deliver(task, observer, DownloadResult::Cancelled);
        }

        let Some(mut image) = task.decode(&data, self.decoder.as_ref()) else {
            // A cancel racing the decode outranks the decode failure.
            if task.is_cancelling() {
                return self.deliver(task, observer, DownloadResult::Cancelled);
            }
            tracing::warn!(
                operation_id = task.id().get(),
                url = %task.url(),
                bytes = data.len(),
                "Downloaded data could not be decoded"
            );
            return self.deliver(task, observer, DownloadResult::UndecodableData(data));
        };

        if task.is_cancelling() {
            return self.deliver(task, observer, DownloadResult::Cancelled);
        }

        if task.has_transform() {
            image = task.transform(image);
            if task.is_cancelling() {
                return self.deliver(task, observer, DownloadResult::Cancelled);
            }
        }

        self.deliver(task, observer, DownloadResult::Decoded(image, data));
    }

    /// Hand the result to the delivery queue: observer first, then the task
    pub(crate) fn deliver(
        &self,
        task: Task,
        observer: Option<Arc<dyn DownloadObserver>>,
        result: DownloadResult,
    ) {
        self.delivery.dispatch(Box::new(move || {
            if let Some(observer) = observer {
                notify_observer(observer.as_ref(), task.url(), &result);
            }
            tracing::debug!(
                operation_id = task.id().get(),
                result = result.kind(),
                "Delivering download result"
            );
            task.complete(result);
        }));
    }
}

fn notify_observer(observer: &dyn DownloadObserver, url: &Url, result: &DownloadResult) {
    match result {
        DownloadResult::Cancelled => observer.on_cancelled(url),
        DownloadResult::NetworkError(e) => observer.on_network_failed(url, e),
        DownloadResult::MissingData => observer.on_decode_failed(url, None),
        DownloadResult::UndecodableData(data) => observer.on_decode_failed(url, Some(data)),
        DownloadResult::Decoded(image, data) => observer.on_decoded(image, data, url),
    }
}

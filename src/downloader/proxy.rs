//! Bridge from transport events to the downloader.
//!
//! The transport holds the proxy, and the proxy holds a clearable pointer to the
//! downloader core. Teardown clears that pointer first; any event arriving
//! afterwards finds nothing to act on.

use std::sync::{Arc, PoisonError, RwLock};

use super::DownloaderCore;
use crate::error::TransportError;
use crate::transport::TransportEvents;
use crate::types::{Disposition, OperationId, ResponseMetadata};

pub(crate) struct SessionDelegateProxy {
    downloader: RwLock<Option<Arc<DownloaderCore>>>,
}

impl SessionDelegateProxy {
    pub(crate) fn new(downloader: Arc<DownloaderCore>) -> Self {
        Self {
            downloader: RwLock::new(Some(downloader)),
        }
    }

    fn downloader(&self) -> Option<Arc<DownloaderCore>> {
        self.downloader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear the back-pointer, returning it if this call was the one to clear it
    pub(crate) fn detach(&self) -> Option<Arc<DownloaderCore>> {
        self.downloader
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.downloader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl TransportEvents for SessionDelegateProxy {
    fn on_response(&self, id: OperationId, response: &ResponseMetadata) -> Disposition {
        let Some(downloader) = self.downloader() else {
            return Disposition::Cancel;
        };

        if let Some(body) = downloader.registry.with_task(id, |task| task.body()) {
            body.set_expected_len(response.content_length);
        }

        let Some(observer) = downloader.observer() else {
            return Disposition::Allow;
        };
        let Some(handle) = downloader.registry.lookup(id) else {
            return Disposition::Allow;
        };

        if observer.should_download(handle.url(), response, &handle) {
            Disposition::Allow
        } else {
            tracing::debug!(
                operation_id = id.get(),
                url = %handle.url(),
                "Observer vetoed download"
            );
            Disposition::Cancel
        }
    }

    fn on_chunk(&self, id: OperationId, chunk: &[u8]) {
        let Some(downloader) = self.downloader() else {
            return;
        };

        let Some((body, progress_handler, handle)) = downloader.registry.with_task(id, |task| {
            (task.body(), task.progress_handler(), task.handle().clone())
        }) else {
            return;
        };

        // The registry lock is released: appends for different operations
        // proceed in parallel, and progress handlers never run under it.
        let progress = body.receive(chunk);
        if let Some(handler) = progress_handler {
            handler(progress, handle.url());
        }
    }

    fn on_terminal(&self, id: OperationId, error: Option<TransportError>) {
        let Some(downloader) = self.downloader() else {
            return;
        };
        let Some(task) = downloader.registry.remove(id) else {
            tracing::debug!(
                operation_id = id.get(),
                "Terminal event for unknown operation ignored"
            );
            return;
        };

        downloader.finish_downloading(task, error);
    }

    fn on_session_invalidated(&self, error: Option<TransportError>) {
        let Some(downloader) = self.detach() else {
            return;
        };

        let dropped = downloader.registry.remove_all();
        downloader.clear_observer();

        match error {
            Some(e) => tracing::warn!(error = %e, dropped, "Transport session invalidated with error"),
            None => tracing::info!(dropped, "Transport session invalidated"),
        }
    }
}

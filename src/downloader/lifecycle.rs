//! Observer management, invalidation, and teardown.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::ImageDownloader;
use crate::observer::DownloadObserver;

impl ImageDownloader {
    /// Current observer, if any
    pub fn observer(&self) -> Option<Arc<dyn DownloadObserver>> {
        self.core.observer()
    }

    /// Replace the observer
    ///
    /// Has no effect once the downloader has been torn down.
    pub fn set_observer(&self, observer: Option<Arc<dyn DownloadObserver>>) {
        if self.proxy.is_attached() {
            self.core.set_observer(observer);
        }
    }

    /// Whether `invalidate` has been called
    pub fn is_invalidated(&self) -> bool {
        !self.core.accepting_new.load(Ordering::SeqCst)
    }

    /// Stop accepting tasks and tear down the transport
    ///
    /// With `allow_finishing_outstanding_tasks`, in-flight transfers run to
    /// completion and their results are delivered as usual; the registry and
    /// observer are released once the transport reports it is invalidated.
    ///
    /// Without it, teardown is immediate: the transport bridge is detached,
    /// the registry is cleared and the observer released before this returns,
    /// and the transport is told to cancel everything. Tasks that had not
    /// reached their terminal event are never reported. Tasks already being
    /// processed still deliver, to the observer that was set when their
    /// transfer terminated and then to their completion handlers.
    pub fn invalidate(&self, allow_finishing_outstanding_tasks: bool) {
        self.core.accepting_new.store(false, Ordering::SeqCst);

        if allow_finishing_outstanding_tasks {
            tracing::info!(
                outstanding = self.core.registry.len(),
                "Invalidating downloader, letting outstanding tasks finish"
            );
            self.session.finish_tasks_and_invalidate();
            return;
        }

        // Detach first: from here on, late transport callbacks are no-ops.
        if let Some(core) = self.proxy.detach() {
            let dropped = core.registry.remove_all();
            core.clear_observer();
            tracing::info!(dropped, "Invalidating downloader, cancelling outstanding tasks");
        }
        self.session.invalidate_and_cancel();
    }

    /// Wait for `shutdown` to resolve, then [`invalidate`](Self::invalidate)
    ///
    /// Returns immediately after invalidating; with
    /// `allow_finishing_outstanding_tasks`, results for tasks still in flight
    /// keep arriving afterwards.
    pub async fn invalidate_on(
        &self,
        shutdown: impl Future<Output = ()>,
        allow_finishing_outstanding_tasks: bool,
    ) {
        shutdown.await;
        tracing::info!("Shutdown requested");
        self.invalidate(allow_finishing_outstanding_tasks);
    }
}

impl Drop for ImageDownloader {
    fn drop(&mut self) {
        if !self.is_invalidated() {
            self.invalidate(false);
        }
    }
}

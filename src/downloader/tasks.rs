//! Task creation and lookup.

use std::sync::atomic::Ordering;

use super::ImageDownloader;
use super::task::{DownloadHandlers, Task, TaskHandle};
use crate::error::{Error, Result};
use crate::transport::Request;
use crate::types::OperationId;

impl ImageDownloader {
    /// Create a download task for `request`
    ///
    /// The task is registered before this returns but not started: call
    /// [`TaskHandle::resume`] to begin the transfer. Exactly one result is
    /// delivered to `handlers`' completion handler, unless the downloader is
    /// invalidated with `allow_finishing_outstanding_tasks = false` before the
    /// transfer finishes.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`invalidate`](ImageDownloader::invalidate)
    /// - any error the transport reports while creating the operation
    pub fn download_image(
        &self,
        request: impl Into<Request>,
        handlers: DownloadHandlers,
    ) -> Result<TaskHandle> {
        if !self.core.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let operation = self.session.create_operation(request.into())?;
        let task = Task::new(operation, handlers);
        let handle = task.handle().clone();
        self.core.registry.add(task);

        // `invalidate` may have run since the check above; its registry sweep
        // could have missed this task.
        if !self.core.accepting_new.load(Ordering::SeqCst) {
            drop(self.core.registry.remove(handle.id()));
            handle.cancel();
            return Err(Error::ShuttingDown);
        }

        tracing::debug!(
            operation_id = handle.id().get(),
            url = %handle.url(),
            "Download task created"
        );

        Ok(handle)
    }

    /// Parse `url` and create a download task for it
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] if `url` does not parse, otherwise as
    /// [`download_image`](ImageDownloader::download_image).
    pub fn download_image_at(&self, url: &str, handlers: DownloadHandlers) -> Result<TaskHandle> {
        self.download_image(Request::parse(url)?, handlers)
    }

    /// Handle to a task whose transfer has not yet finished
    pub fn task(&self, id: OperationId) -> Option<TaskHandle> {
        self.core.registry.lookup(id)
    }

    /// Number of tasks whose transfer has not yet finished
    pub fn active_tasks(&self) -> usize {
        self.core.registry.len()
    }
}

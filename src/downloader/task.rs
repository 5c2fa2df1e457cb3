//! Per-operation task state and the public handle to it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use url::Url;

use crate::decoder::ImageDecoder;
use crate::transport::Operation;
use crate::types::{DownloadResult, Image, OperationId, OperationState, Progress};

/// Upper bound on the buffer pre-allocated from a declared content length
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Called after every received chunk, on the transport's delivery context
pub type ProgressHandler = Arc<dyn Fn(Progress, &Url) + Send + Sync>;

/// Tried before the downloader's default decoder for one task
pub type DecodingHandler = Box<dyn Fn(&[u8], &Url) -> Option<Image> + Send>;

/// Produces a replacement image from the decoded one
pub type TransformHandler = Box<dyn Fn(Image, &Url) -> Image + Send>;

/// Receives the task's terminal result, exactly once
pub type CompletionHandler = Box<dyn FnOnce(DownloadResult, &Url) + Send>;

/// Optional handlers attached to a download task
///
/// # Examples
///
/// ```
/// use webimage_dl::DownloadHandlers;
///
/// let handlers = DownloadHandlers::new()
///     .transform_with(|image, _url| image.thumbnail(64, 64))
///     .on_complete(|result, url| println!("{url}: {}", result.kind()));
/// ```
#[derive(Default)]
pub struct DownloadHandlers {
    pub(crate) progress: Option<ProgressHandler>,
    pub(crate) decoding: Option<DecodingHandler>,
    pub(crate) transform: Option<TransformHandler>,
    pub(crate) completion: Option<CompletionHandler>,
}

impl DownloadHandlers {
    /// No handlers: default decoding, no transform, result discarded
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe byte progress
    pub fn on_progress(mut self, handler: impl Fn(Progress, &Url) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(handler));
        self
    }

    /// Decode with `handler` first; the default decoder is used when it returns `None`
    pub fn decode_with(
        mut self,
        handler: impl Fn(&[u8], &Url) -> Option<Image> + Send + 'static,
    ) -> Self {
        self.decoding = Some(Box::new(handler));
        self
    }

    /// Transform the decoded image before delivery
    pub fn transform_with(mut self, handler: impl Fn(Image, &Url) -> Image + Send + 'static) -> Self {
        self.transform = Some(Box::new(handler));
        self
    }

    /// Receive the terminal result
    pub fn on_complete(
        mut self,
        handler: impl FnOnce(DownloadResult, &Url) + Send + 'static,
    ) -> Self {
        self.completion = Some(Box::new(handler));
        self
    }
}

/// Caller-facing handle to a download task
///
/// Cloneable and cheap. Controls act on the underlying transport operation; the
/// handle stays valid after the task has finished, at which point the controls
/// are no-ops.
#[derive(Clone)]
pub struct TaskHandle {
    operation: Arc<dyn Operation>,
}

impl TaskHandle {
    pub(crate) fn new(operation: Arc<dyn Operation>) -> Self {
        Self { operation }
    }

    /// Identifier of the underlying operation
    pub fn id(&self) -> OperationId {
        self.operation.id()
    }

    /// URL being downloaded
    pub fn url(&self) -> &Url {
        self.operation.request().url()
    }

    /// Start the transfer, or continue it after `suspend()`
    pub fn resume(&self) {
        self.operation.resume();
    }

    /// Pause the transfer
    pub fn suspend(&self) {
        self.operation.suspend();
    }

    /// Cancel the task
    ///
    /// Cancellation is cooperative. A task whose transfer already finished is
    /// still reported as cancelled if the processing pipeline has not delivered
    /// its result yet.
    pub fn cancel(&self) {
        self.operation.cancel();
    }

    /// Current state of the underlying operation
    pub fn state(&self) -> OperationState {
        self.operation.state()
    }

    /// Whether `cancel()` has been called
    pub fn is_cancelling(&self) -> bool {
        self.state() == OperationState::Cancelling
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("url", &self.url().as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Payload accumulated for one task
///
/// Lives outside the registry map so that appending a chunk never holds the
/// registry lock. Chunks for one operation arrive serially and the terminal
/// event follows the last of them, so this lock is uncontended in practice.
#[derive(Default)]
pub(crate) struct TaskBody {
    state: Mutex<BodyState>,
}

#[derive(Default)]
pub(crate) struct BodyState {
    buffer: Option<BytesMut>,
    expected_len: Option<u64>,
}

impl TaskBody {
    fn state(&self) -> MutexGuard<'_, BodyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_expected_len(&self, expected: Option<u64>) {
        self.state().expected_len = expected;
    }

    /// Append a chunk, allocating the buffer on first use
    pub(crate) fn receive(&self, chunk: &[u8]) -> Progress {
        let mut state = self.state();
        let expected = state.expected_len;
        let buffer = state.buffer.get_or_insert_with(|| {
            let capacity = expected.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
            BytesMut::with_capacity(capacity.max(chunk.len()))
        });
        buffer.extend_from_slice(chunk);

        Progress {
            received: buffer.len() as u64,
            expected,
        }
    }

    pub(crate) fn received_len(&self) -> usize {
        self.state().buffer.as_ref().map_or(0, BytesMut::len)
    }

    /// Hand the buffer over; `None` when nothing was received
    pub(crate) fn take(&self) -> Option<Bytes> {
        self.state()
            .buffer
            .take()
            .filter(|buffer| !buffer.is_empty())
            .map(BytesMut::freeze)
    }

    /// Block every append until the returned guard is dropped
    #[cfg(test)]
    pub(crate) fn hold(&self) -> MutexGuard<'_, BodyState> {
        self.state()
    }
}

/// One in-flight download
///
/// Owned by the registry while the transfer runs. The body is shared with the
/// transport bridge for chunk appends and taken exactly once, after the
/// terminal event removed the task from the registry.
pub(crate) struct Task {
    handle: TaskHandle,
    body: Arc<TaskBody>,
    handlers: DownloadHandlers,
}

impl Task {
    pub(crate) fn new(operation: Arc<dyn Operation>, handlers: DownloadHandlers) -> Self {
        Self {
            handle: TaskHandle::new(operation),
            body: Arc::new(TaskBody::default()),
            handlers,
        }
    }

    pub(crate) fn id(&self) -> OperationId {
        self.handle.id()
    }

    pub(crate) fn url(&self) -> &Url {
        self.handle.url()
    }

    pub(crate) fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub(crate) fn state(&self) -> OperationState {
        self.handle.state()
    }

    pub(crate) fn is_cancelling(&self) -> bool {
        self.state() == OperationState::Cancelling
    }

    pub(crate) fn body(&self) -> Arc<TaskBody> {
        Arc::clone(&self.body)
    }

    #[cfg(test)]
    pub(crate) fn set_expected_len(&self, expected: Option<u64>) {
        self.body.set_expected_len(expected);
    }

    #[cfg(test)]
    pub(crate) fn receive(&self, chunk: &[u8]) -> Progress {
        self.body.receive(chunk)
    }

    pub(crate) fn received_len(&self) -> usize {
        self.body.received_len()
    }

    pub(crate) fn progress_handler(&self) -> Option<ProgressHandler> {
        self.handlers.progress.clone()
    }

    /// Hand the buffer over to processing; `None` when nothing was received
    pub(crate) fn take_data(&self) -> Option<Bytes> {
        self.body.take()
    }

    /// Decode with the task's handler, falling back to `default` when it
    /// declines or is absent
    pub(crate) fn decode(&self, data: &[u8], default: &dyn ImageDecoder) -> Option<Image> {
        match &self.handlers.decoding {
            Some(handler) => handler(data, self.url()).or_else(|| default.decode(data)),
            None => default.decode(data),
        }
    }

    pub(crate) fn has_transform(&self) -> bool {
        self.handlers.transform.is_some()
    }

    pub(crate) fn transform(&self, image: Image) -> Image {
        match &self.handlers.transform {
            Some(handler) => handler(image, self.url()),
            None => image,
        }
    }

    /// Consume the task, handing `result` to its completion handler
    pub(crate) fn complete(self, result: DownloadResult) {
        let Task {
            handle, handlers, ..
        } = self;
        if let Some(completion) = handlers.completion {
            completion(result, handle.url());
        }
    }
}

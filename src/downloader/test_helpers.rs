//! Shared test helpers: a scripted in-memory transport and result plumbing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use crate::config::Config;
use crate::decoder::ImageDecoder;
use crate::downloader::{DownloadHandlers, ImageDownloader};
use crate::error::{Result, TransportError};
use crate::observer::DownloadObserver;
use crate::transport::{Operation, Request, Transport, TransportEvents};
use crate::types::{
    Disposition, DownloadResult, Image, OperationId, OperationState, ResponseMetadata,
};

/// Which invalidation the downloader asked the transport for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Invalidation {
    FinishTasks,
    Cancel,
}

/// Operation whose state is driven by handle calls; it never emits events itself
pub(crate) struct ScriptedOperation {
    id: OperationId,
    request: Request,
    state: Mutex<OperationState>,
    resumes: AtomicU64,
}

impl ScriptedOperation {
    fn new(id: OperationId, request: Request) -> Self {
        Self {
            id,
            request,
            state: Mutex::new(OperationState::Suspended),
            resumes: AtomicU64::new(0),
        }
    }

    pub(crate) fn resume_count(&self) -> u64 {
        self.resumes.load(Ordering::SeqCst)
    }
}

impl Operation for ScriptedOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn request(&self) -> &Request {
        &self.request
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state == OperationState::Suspended {
            *state = OperationState::Active;
        }
    }

    fn suspend(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == OperationState::Active {
            *state = OperationState::Suspended;
        }
    }

    fn cancel(&self) {
        *self.state.lock().unwrap() = OperationState::Cancelling;
    }

    fn state(&self) -> OperationState {
        *self.state.lock().unwrap()
    }
}

/// A standalone operation for unit tests that never touch a transport
pub(crate) fn scripted_operation(id: u64) -> Arc<dyn Operation> {
    let request = Request::parse(&format!("https://images.test/{id}.png")).unwrap();
    Arc::new(ScriptedOperation::new(OperationId(id), request))
}

/// In-memory transport: tests play the network's role by calling
/// [`chunk`](ScriptedTransport::chunk), [`finish`](ScriptedTransport::finish)
/// and friends, which forward straight to the downloader's event sink.
pub(crate) struct ScriptedTransport {
    events: OnceLock<Arc<dyn TransportEvents>>,
    next_id: AtomicU64,
    operations: Mutex<HashMap<OperationId, Arc<ScriptedOperation>>>,
    invalidations: Mutex<Vec<Invalidation>>,
    fixed_id: Mutex<Option<OperationId>>,
    before_create: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: OnceLock::new(),
            next_id: AtomicU64::new(1),
            operations: Mutex::new(HashMap::new()),
            invalidations: Mutex::new(Vec::new()),
            fixed_id: Mutex::new(None),
            before_create: Mutex::new(None),
        })
    }

    /// Connect the downloader's event sink; later calls are ignored
    pub(crate) fn attach(&self, events: Arc<dyn TransportEvents>) {
        let _ = self.events.set(events);
    }

    fn events(&self) -> &Arc<dyn TransportEvents> {
        self.events.get().expect("transport not attached to a downloader")
    }

    /// Create an operation without going through a downloader
    pub(crate) fn new_operation(&self, url: &str) -> Arc<dyn Operation> {
        self.create_operation(Request::parse(url).unwrap()).unwrap()
    }

    /// Hand out `id` for every following operation, simulating an id collision
    pub(crate) fn force_operation_id(&self, id: OperationId) {
        *self.fixed_id.lock().unwrap() = Some(id);
    }

    /// Run `hook` once, at the start of the next `create_operation`
    pub(crate) fn before_next_create(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_create.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn operation(&self, id: OperationId) -> Arc<ScriptedOperation> {
        self.operations.lock().unwrap()[&id].clone()
    }

    pub(crate) fn respond(&self, id: OperationId, content_length: Option<u64>) -> Disposition {
        let url = self.operation(id).request().url().clone();
        let metadata = ResponseMetadata {
            url,
            status: Some(200),
            content_type: Some("image/png".into()),
            content_length,
        };
        self.events().on_response(id, &metadata)
    }

    pub(crate) fn chunk(&self, id: OperationId, data: &[u8]) {
        self.events().on_chunk(id, data);
    }

    /// Deliver the terminal event, marking the operation completed unless it was cancelled
    pub(crate) fn finish(&self, id: OperationId, error: Option<TransportError>) {
        if let Some(operation) = self.operations.lock().unwrap().get(&id) {
            let mut state = operation.state.lock().unwrap();
            if *state != OperationState::Cancelling {
                *state = OperationState::Completed;
            }
        }
        self.events().on_terminal(id, error);
    }

    /// Report the session as invalidated
    pub(crate) fn report_invalidated(&self) {
        self.events().on_session_invalidated(None);
    }

    pub(crate) fn invalidations(&self) -> Vec<Invalidation> {
        self.invalidations.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn create_operation(&self, request: Request) -> Result<Arc<dyn Operation>> {
        let hook = self.before_create.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let id = match *self.fixed_id.lock().unwrap() {
            Some(id) => id,
            None => OperationId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        };
        let operation = Arc::new(ScriptedOperation::new(id, request));
        self.operations
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&operation));
        Ok(operation)
    }

    fn finish_tasks_and_invalidate(&self) {
        self.invalidations
            .lock()
            .unwrap()
            .push(Invalidation::FinishTasks);
    }

    fn invalidate_and_cancel(&self) {
        self.invalidations.lock().unwrap().push(Invalidation::Cancel);
        for operation in self.operations.lock().unwrap().values() {
            operation.cancel();
        }
    }
}

/// Accepts payloads starting with `IMG`, producing a `len x 1` image
pub(crate) struct StubDecoder;

impl ImageDecoder for StubDecoder {
    fn decode(&self, data: &[u8]) -> Option<Image> {
        data.starts_with(b"IMG")
            .then(|| Image::new_rgba8(data.len() as u32, 1))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Records observer callbacks into a shared log
pub(crate) struct RecordingObserver {
    pub(crate) log: Arc<Mutex<Vec<String>>>,
    pub(crate) allow: bool,
}

impl RecordingObserver {
    pub(crate) fn new(log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self { log, allow: true })
    }

    pub(crate) fn vetoing(log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self { log, allow: false })
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl DownloadObserver for RecordingObserver {
    fn should_download(
        &self,
        url: &Url,
        _response: &ResponseMetadata,
        task: &crate::downloader::TaskHandle,
    ) -> bool {
        assert_eq!(url, task.url());
        self.record(format!("observer:should_download:{}", task.id()));
        self.allow
    }

    fn on_cancelled(&self, _url: &Url) {
        self.record("observer:cancelled".into());
    }

    fn on_network_failed(&self, _url: &Url, error: &TransportError) {
        self.record(format!("observer:network_failed:{}", error.error_code()));
    }

    fn on_decode_failed(&self, _url: &Url, data: Option<&Bytes>) {
        match data {
            Some(data) => self.record(format!("observer:decode_failed:{}", data.len())),
            None => self.record("observer:decode_failed:none".into()),
        }
    }

    fn on_decoded(&self, image: &Image, data: &Bytes, _url: &Url) {
        self.record(format!("observer:decoded:{}x{}:{}", image.width(), image.height(), data.len()));
    }
}

/// Downloader wired to a scripted transport, stub decoder, and default serial delivery
pub(crate) fn create_test_downloader(
    observer: Option<Arc<dyn DownloadObserver>>,
) -> (ImageDownloader, Arc<ScriptedTransport>) {
    let transport = ScriptedTransport::new();
    let attached = Arc::clone(&transport);

    let mut builder = ImageDownloader::builder(Config::default())
        .decoder(Arc::new(StubDecoder))
        .transport(move |_config, events, _runtime| {
            attached.attach(events);
            Ok(attached as Arc<dyn Transport>)
        });
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }

    (builder.build().unwrap(), transport)
}

/// Handlers whose completion handler forwards the result into a channel
pub(crate) fn capture_result() -> (DownloadHandlers, mpsc::UnboundedReceiver<DownloadResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = DownloadHandlers::new().on_complete(move |result, _url| {
        let _ = tx.send(result);
    });
    (handlers, rx)
}

/// Wait for the next delivered result
pub(crate) async fn next_result(rx: &mut mpsc::UnboundedReceiver<DownloadResult>) -> DownloadResult {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a download result")
        .expect("completion handler dropped without delivering")
}

/// Assert the completion handler was dropped without ever being called
pub(crate) async fn assert_never_delivered(rx: &mut mpsc::UnboundedReceiver<DownloadResult>) {
    let outcome = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for the completion handler to be dropped");
    assert!(
        outcome.is_none(),
        "expected no delivery, got {:?}",
        outcome.map(|r| r.kind())
    );
}

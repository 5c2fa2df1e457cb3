//! Core downloader implementation split into focused submodules.
//!
//! The `ImageDownloader` struct and its machinery are organized by concern:
//! - [`registry`] - Thread-safe map of in-flight tasks
//! - [`task`] - Per-operation state, handlers, and the public task handle
//! - [`proxy`] - Transport event bridge with a clearable back-pointer
//! - [`completion`] - Terminal classification, processing pipeline, delivery
//! - [`queue`] - Processing pool and delivery queues
//! - [`tasks`] - Task creation
//! - [`lifecycle`] - Invalidation and teardown

mod completion;
mod lifecycle;
mod proxy;
mod queue;
mod registry;
mod task;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use queue::{ConcurrentQueue, DeliveryQueue, Job, SerialQueue};
pub use task::{
    CompletionHandler, DecodingHandler, DownloadHandlers, ProgressHandler, TaskHandle,
    TransformHandler,
};

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;

use crate::config::{Config, DeliveryMode, TransportConfig};
use crate::decoder::{DefaultDecoder, ImageDecoder};
use crate::error::{Error, Result};
use crate::observer::DownloadObserver;
use crate::transport::{HttpSession, Transport, TransportEvents};
use proxy::SessionDelegateProxy;
use queue::ProcessPool;
use registry::TaskRegistry;

/// Builds the transport for a new downloader, given the events sink it must report to
pub type TransportFactory = Box<
    dyn FnOnce(&TransportConfig, Arc<dyn TransportEvents>, Handle) -> Result<Arc<dyn Transport>>
        + Send,
>;

/// State shared by the downloader, the transport bridge, and in-flight pipelines
pub(crate) struct DownloaderCore {
    /// In-flight tasks, keyed by operation id
    pub(crate) registry: TaskRegistry,
    /// Optional downloader-wide observer, cleared exactly once on teardown
    observer: RwLock<Option<Arc<dyn DownloadObserver>>>,
    /// Decoder used by tasks without their own decoding handler
    pub(crate) decoder: Arc<dyn ImageDecoder>,
    /// Concurrent decode/transform pool
    pub(crate) process_pool: ProcessPool,
    /// Where results are delivered
    pub(crate) delivery: Arc<dyn DeliveryQueue>,
    /// Cleared by `invalidate`; no tasks are created afterwards
    pub(crate) accepting_new: AtomicBool,
}

impl DownloaderCore {
    pub(crate) fn observer(&self) -> Option<Arc<dyn DownloadObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_observer(&self, observer: Option<Arc<dyn DownloadObserver>>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub(crate) fn clear_observer(&self) {
        self.set_observer(None);
    }
}

/// Orchestrates concurrent fetch → decode → transform pipelines
///
/// Owns the transport session, the task registry, the transport bridge, the
/// processing pool, and the delivery queue. Dropping a downloader that has not
/// been invalidated tears it down as `invalidate(false)` would.
///
/// # Examples
///
/// ```no_run
/// use webimage_dl::{Config, DownloadHandlers, ImageDownloader};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ImageDownloader::new(Config::default(), None)?;
///
///     let (tx, rx) = tokio::sync::oneshot::channel();
///     let task = downloader.download_image_at(
///         "https://example.com/cat.png",
///         DownloadHandlers::new().on_complete(move |result, _url| {
///             let _ = tx.send(result);
///         }),
///     )?;
///     task.resume();
///
///     println!("{}", rx.await?.kind());
///     Ok(())
/// }
/// ```
pub struct ImageDownloader {
    pub(crate) core: Arc<DownloaderCore>,
    pub(crate) proxy: Arc<SessionDelegateProxy>,
    pub(crate) session: Arc<dyn Transport>,
    pub(crate) config: Arc<Config>,
}

impl ImageDownloader {
    /// Create a downloader with the default HTTP transport, decoder, and delivery queue
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, observer: Option<Arc<dyn DownloadObserver>>) -> Result<Self> {
        let mut builder = Self::builder(config);
        if let Some(observer) = observer {
            builder = builder.observer(observer);
        }
        builder.build()
    }

    /// Start configuring a downloader
    pub fn builder(config: Config) -> DownloaderBuilder {
        DownloaderBuilder::new(config)
    }

    /// Get the configuration the downloader was built with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

/// Step-by-step construction of an [`ImageDownloader`]
pub struct DownloaderBuilder {
    config: Config,
    observer: Option<Arc<dyn DownloadObserver>>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    delivery: Option<Arc<dyn DeliveryQueue>>,
    transport: Option<TransportFactory>,
    runtime: Option<Handle>,
}

impl DownloaderBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            observer: None,
            decoder: None,
            delivery: None,
            transport: None,
            runtime: None,
        }
    }

    /// Downloader-wide observer
    pub fn observer(mut self, observer: Arc<dyn DownloadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Default decoder for tasks without a decoding handler
    pub fn decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Custom delivery queue, overriding the configured delivery mode
    pub fn delivery_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.delivery = Some(queue);
        self
    }

    /// Custom transport in place of [`HttpSession`]
    pub fn transport(
        mut self,
        factory: impl FnOnce(&TransportConfig, Arc<dyn TransportEvents>, Handle) -> Result<Arc<dyn Transport>>
        + Send
        + 'static,
    ) -> Self {
        self.transport = Some(Box::new(factory));
        self
    }

    /// Runtime for the transport, the processing pool, and the default delivery queue
    ///
    /// Defaults to the runtime `build()` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate the configuration and wire everything together
    pub fn build(self) -> Result<ImageDownloader> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?,
        };

        let delivery: Arc<dyn DeliveryQueue> = match self.delivery {
            Some(queue) => queue,
            None => match self.config.delivery.delivery_mode {
                DeliveryMode::Serial => Arc::new(SerialQueue::new(&runtime)),
                DeliveryMode::Concurrent => Arc::new(ConcurrentQueue::new(runtime.clone())),
            },
        };
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(DefaultDecoder) as Arc<dyn ImageDecoder>);

        let core = Arc::new(DownloaderCore {
            registry: TaskRegistry::new(),
            observer: RwLock::new(self.observer),
            decoder,
            process_pool: ProcessPool::new(
                runtime.clone(),
                self.config.processing.max_concurrent_processing,
            ),
            delivery,
            accepting_new: AtomicBool::new(true),
        });

        let proxy = Arc::new(SessionDelegateProxy::new(Arc::clone(&core)));
        let events: Arc<dyn TransportEvents> = proxy.clone();

        let session = match self.transport {
            Some(factory) => factory(&self.config.transport, events, runtime)?,
            None => Arc::new(HttpSession::new(&self.config.transport, events, runtime)?),
        };

        tracing::info!(
            session = %self.config.transport.session_description,
            decoder = core.decoder.name(),
            max_concurrent_processing = self.config.processing.max_concurrent_processing,
            delivery_mode = ?self.config.delivery.delivery_mode,
            "Image downloader initialized"
        );

        Ok(ImageDownloader {
            core,
            proxy,
            session,
            config: Arc::new(self.config),
        })
    }
}

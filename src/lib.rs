//! # webimage-dl
//!
//! Concurrent image download orchestration: fetch, decode, transform, deliver.
//!
//! ## Design Philosophy
//!
//! webimage-dl is designed to be:
//! - **Exactly-once** - Every task's completion handler runs at most once, and
//!   exactly once unless the downloader is torn down underneath it
//! - **Cancellation-first** - A cancelled task reports `Cancelled`, even if its
//!   bytes arrived or its decode succeeded
//! - **Pluggable** - Transport, decoder, observer, and delivery queue can all be
//!   replaced
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use webimage_dl::{Config, DownloadHandlers, DownloadResult, ImageDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = ImageDownloader::new(Config::default(), None)?;
//!
//!     let handlers = DownloadHandlers::new()
//!         .on_progress(|progress, url| {
//!             println!("{url}: {} bytes", progress.received);
//!         })
//!         .on_complete(|result, url| match result {
//!             DownloadResult::Decoded(image, data) => {
//!                 println!("{url}: {}x{} from {} bytes", image.width(), image.height(), data.len());
//!             }
//!             other => println!("{url}: {}", other.kind()),
//!         });
//!
//!     let task = downloader.download_image_at("https://example.com/cat.png", handlers)?;
//!     task.resume();
//!
//!     // Let outstanding work finish before tearing down
//!     downloader.invalidate(true);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Default and pluggable image decoding
pub mod decoder;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Downloader-wide observer hooks
pub mod observer;
/// Transport abstraction and the HTTP session
pub mod transport;
/// Core types and results
pub mod types;

// Re-export commonly used types
pub use config::{Config, DeliveryConfig, DeliveryMode, ProcessingConfig, TransportConfig};
pub use decoder::{DefaultDecoder, ImageDecoder};
pub use downloader::{
    CompletionHandler, ConcurrentQueue, DecodingHandler, DeliveryQueue, DownloadHandlers,
    DownloaderBuilder, ImageDownloader, Job, ProgressHandler, SerialQueue, TaskHandle,
    TransformHandler, TransportFactory,
};
pub use error::{Error, Result, TransportError};
pub use observer::{DownloadObserver, NoOpObserver};
pub use transport::{HttpSession, Operation, Request, Transport, TransportEvents};
pub use types::{
    Disposition, DownloadResult, Image, OperationId, OperationState, Progress, ResponseMetadata,
};

/// Wait for a termination signal, then invalidate the downloader.
///
/// Shorthand for [`ImageDownloader::invalidate_on`] with [`shutdown_signal`].
///
/// # Example
///
/// ```no_run
/// use webimage_dl::{Config, ImageDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ImageDownloader::new(Config::default(), None)?;
///
///     // Queue work, then wait for Ctrl+C
///     run_with_shutdown(&downloader, true).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: &ImageDownloader, allow_finishing_outstanding_tasks: bool) {
    downloader
        .invalidate_on(shutdown_signal(), allow_finishing_outstanding_tasks)
        .await;
}

/// Resolves on SIGTERM or Ctrl+C (Ctrl+C only outside Unix)
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                    _ = ctrl_c() => {}
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for Ctrl+C only");
            }
        }
    }

    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}

//! Execution contexts: the processing pool and the delivery queues.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};

/// A unit of work handed to a queue
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where observer callbacks and completion handlers run
///
/// Implement this to deliver results on an executor of your own (a UI
/// thread, for instance). Jobs for one task are dispatched exactly once; the
/// queue decides how jobs from different tasks relate to each other.
pub trait DeliveryQueue: Send + Sync {
    /// Run `job` at some point in the future
    fn dispatch(&self, job: Job);
}

/// Runs jobs one at a time, in dispatch order
///
/// Jobs are executed on tokio's blocking pool, so a slow handler never stalls
/// an async worker.
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Start the queue's drain task on `runtime`
    pub fn new(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    tracing::error!(error = %e, "Delivery job panicked");
                }
            }
            tracing::debug!("Serial delivery queue drained and closed");
        });

        Self { tx }
    }
}

impl DeliveryQueue for SerialQueue {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("Serial delivery queue is closed, dropping job");
        }
    }
}

/// Runs every job as soon as a blocking thread is free
pub struct ConcurrentQueue {
    runtime: Handle,
}

impl ConcurrentQueue {
    /// Create a queue spawning onto `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl DeliveryQueue for ConcurrentQueue {
    fn dispatch(&self, job: Job) {
        self.runtime.spawn_blocking(job);
    }
}

/// Concurrent pool for decode/transform pipelines
///
/// At most `width` pipelines run at once; the rest wait for a permit.
#[derive(Clone)]
pub(crate) struct ProcessPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
}

impl ProcessPool {
    pub(crate) fn new(runtime: Handle, width: usize) -> Self {
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(width)),
        }
    }

    pub(crate) fn spawn(&self, job: Job) {
        let permits = Arc::clone(&self.permits);
        self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!("Processing pool closed, dropping pipeline");
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                tracing::error!(error = %e, "Processing pipeline panicked");
            }
        });
    }
}

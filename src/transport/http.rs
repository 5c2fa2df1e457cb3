//! reqwest-backed transport session
//!
//! Each operation is driven by one tokio task, which makes per-operation event
//! delivery serial by construction. Cancellation uses a
//! [`CancellationToken`]; suspension parks the task between chunks on a
//! `watch` channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{Operation, Request, Transport, TransportEvents};
use crate::config::TransportConfig;
use crate::error::{Error, Result, TransportError};
use crate::types::{Disposition, OperationId, OperationState, ResponseMetadata};

// Atomic codes of `OperationState`, usable as match patterns
const ACTIVE: u8 = OperationState::Active.to_u8();
const SUSPENDED: u8 = OperationState::Suspended.to_u8();
const CANCELLING: u8 = OperationState::Cancelling.to_u8();
const COMPLETED: u8 = OperationState::Completed.to_u8();

/// Default transport: plain GET requests through a shared `reqwest::Client`
pub struct HttpSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: reqwest::Client,
    events: Arc<dyn TransportEvents>,
    runtime: Handle,
    description: String,
    next_id: AtomicU64,
    /// Operations that have not yet delivered their terminal event
    live: Mutex<HashMap<OperationId, Arc<HttpOperation>>>,
    invalidating: AtomicBool,
    invalidated: AtomicBool,
}

impl HttpSession {
    /// Build a session delivering its events to `events`
    ///
    /// Operation tasks are spawned on `runtime`.
    pub fn new(
        config: &TransportConfig,
        events: Arc<dyn TransportEvents>,
        runtime: Handle,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::from(e)))?;

        tracing::debug!(
            session = %config.session_description,
            "HTTP transport session created"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                events,
                runtime,
                description: config.session_description.clone(),
                next_id: AtomicU64::new(1),
                live: Mutex::new(HashMap::new()),
                invalidating: AtomicBool::new(false),
                invalidated: AtomicBool::new(false),
            }),
        })
    }

    /// Number of operations that have not delivered their terminal event
    pub fn live_operations(&self) -> usize {
        self.inner.live().len()
    }
}

impl Transport for HttpSession {
    fn create_operation(&self, request: Request) -> Result<Arc<dyn Operation>> {
        if self.inner.invalidating.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = OperationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::downgrade(&self.inner);
        let (running, _) = watch::channel(false);
        let operation = Arc::new_cyclic(|me| HttpOperation {
            id,
            request,
            me: me.clone(),
            session,
            state: AtomicU8::new(SUSPENDED),
            started: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            running,
        });

        self.inner.live().insert(id, Arc::clone(&operation));
        Ok(operation)
    }

    fn finish_tasks_and_invalidate(&self) {
        tracing::info!(
            session = %self.inner.description,
            "Invalidating session after outstanding operations finish"
        );
        self.inner.invalidating.store(true, Ordering::SeqCst);
        self.inner.finish_invalidation_if_idle();
    }

    fn invalidate_and_cancel(&self) {
        tracing::info!(
            session = %self.inner.description,
            "Invalidating session and cancelling outstanding operations"
        );
        self.inner.invalidating.store(true, Ordering::SeqCst);

        // Cancel outside the lock: cancel() may spawn, and the spawned task
        // takes the lock when it terminates.
        let outstanding: Vec<_> = self.inner.live().values().cloned().collect();
        for operation in outstanding {
            operation.cancel();
        }

        self.inner.finish_invalidation_if_idle();
    }
}

impl SessionInner {
    fn live(&self) -> MutexGuard<'_, HashMap<OperationId, Arc<HttpOperation>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_invalidation_if_idle(&self) {
        if !self.invalidating.load(Ordering::SeqCst) || !self.live().is_empty() {
            return;
        }
        if self.invalidated.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(session = %self.description, "Session invalidated");
        self.events.on_session_invalidated(None);
    }
}

struct HttpOperation {
    id: OperationId,
    request: Request,
    me: Weak<HttpOperation>,
    session: Weak<SessionInner>,
    state: AtomicU8,
    started: AtomicBool,
    cancel_token: CancellationToken,
    /// `true` while the transfer may proceed
    running: watch::Sender<bool>,
}

impl HttpOperation {
    /// Spawn the driving task, at most once per operation
    fn start_once(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let (Some(operation), Some(session)) = (self.me.upgrade(), self.session.upgrade()) else {
            return;
        };

        let runtime = session.runtime.clone();
        runtime.spawn(run_operation(session, operation));
    }

    async fn wait_until_running(&self) {
        let mut running = self.running.subscribe();
        // The sender lives as long as `self`, so this only fails if the
        // operation is being torn down, in which case there is nothing to wait for.
        let _ = running.wait_for(|running| *running).await;
    }
}

impl Operation for HttpOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn request(&self) -> &Request {
        &self.request
    }

    fn resume(&self) {
        let resumed = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| match state {
                ACTIVE | SUSPENDED => Some(ACTIVE),
                _ => None,
            })
            .is_ok();
        if !resumed {
            return;
        }

        self.running.send_replace(true);
        self.start_once();
    }

    fn suspend(&self) {
        if self
            .state
            .compare_exchange(ACTIVE, SUSPENDED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.running.send_replace(false);
        }
    }

    fn cancel(&self) {
        let previous = self.state.swap(CANCELLING, Ordering::SeqCst);
        if previous == CANCELLING {
            return;
        }

        self.cancel_token.cancel();
        if previous != COMPLETED {
            // An operation that never started still owes its owner a terminal event.
            self.start_once();
        }
    }

    fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

async fn run_operation(session: Arc<SessionInner>, operation: Arc<HttpOperation>) {
    let id = operation.id;

    let outcome = tokio::select! {
        biased;
        _ = operation.cancel_token.cancelled() => Err(TransportError::Cancelled),
        result = transfer(&session, &operation) => result,
    };

    let _ = operation
        .state
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
            (state != CANCELLING).then_some(COMPLETED)
        });

    match &outcome {
        Ok(()) => tracing::debug!(operation_id = id.get(), "Operation completed"),
        Err(e) if e.is_cancellation() => {
            tracing::debug!(operation_id = id.get(), "Operation cancelled")
        }
        Err(e) => tracing::debug!(operation_id = id.get(), error = %e, "Operation failed"),
    }

    session.events.on_terminal(id, outcome.err());

    // Removed only after the terminal event so that invalidation is never
    // reported ahead of it.
    session.live().remove(&id);
    session.finish_invalidation_if_idle();
}

async fn transfer(
    session: &SessionInner,
    operation: &HttpOperation,
) -> std::result::Result<(), TransportError> {
    operation.wait_until_running().await;

    let mut response = session
        .client
        .get(operation.request.url().clone())
        .send()
        .await?;

    let metadata = ResponseMetadata {
        url: response.url().clone(),
        status: Some(response.status().as_u16()),
        content_type: response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        content_length: response.content_length(),
    };

    if session.events.on_response(operation.id, &metadata) == Disposition::Cancel {
        operation.cancel();
        return Err(TransportError::Cancelled);
    }

    loop {
        operation.wait_until_running().await;
        match response.chunk().await? {
            Some(chunk) => session.events.on_chunk(operation.id, &chunk),
            None => return Ok(()),
        }
    }
}

//! Transport collaborator interface
//!
//! The downloader never talks to the network directly. It creates operations on
//! a [`Transport`] and receives their progress through [`TransportEvents`].
//! Implementations must honour two delivery rules:
//! - events for a single operation are delivered serially, in order, ending
//!   with exactly one `on_terminal` call;
//! - events for different operations may be delivered concurrently.
//!
//! [`HttpSession`] is the default, reqwest-backed implementation.

mod http;

pub use http::HttpSession;

use std::sync::Arc;

use url::Url;

use crate::error::{Result, TransportError};
use crate::types::{Disposition, OperationId, OperationState, ResponseMetadata};

/// What to fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    url: Url,
}

impl Request {
    /// Create a request for `url`
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Parse `url` and create a request for it
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// The URL this request targets
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl From<Url> for Request {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

/// One network operation, owned by its transport
///
/// Operations are created suspended: nothing is transferred until `resume()`.
pub trait Operation: Send + Sync {
    /// Identifier unique among the transport's live operations
    fn id(&self) -> OperationId;

    /// The request this operation was created for
    fn request(&self) -> &Request;

    /// Start, or continue after `suspend()`
    fn resume(&self);

    /// Pause delivery until the next `resume()`
    fn suspend(&self);

    /// Abort; the operation terminates with [`TransportError::Cancelled`]
    /// unless it already terminated
    fn cancel(&self);

    /// Current state
    fn state(&self) -> OperationState;
}

/// Callbacks a transport delivers to its owner
pub trait TransportEvents: Send + Sync {
    /// Response metadata arrived; the answer decides whether the body is read
    fn on_response(&self, _id: OperationId, _response: &ResponseMetadata) -> Disposition {
        Disposition::Allow
    }

    /// A chunk of the payload arrived
    fn on_chunk(&self, id: OperationId, chunk: &[u8]);

    /// The operation finished, successfully when `error` is `None`
    fn on_terminal(&self, id: OperationId, error: Option<TransportError>);

    /// The session was invalidated and will deliver no further events
    fn on_session_invalidated(&self, error: Option<TransportError>);
}

/// A session issuing network operations
pub trait Transport: Send + Sync {
    /// Create a new, suspended operation
    ///
    /// Fails with [`Error::ShuttingDown`](crate::Error::ShuttingDown) once the
    /// session has been invalidated.
    fn create_operation(&self, request: Request) -> Result<Arc<dyn Operation>>;

    /// Refuse new operations, let in-flight ones finish, then report
    /// `on_session_invalidated`
    fn finish_tasks_and_invalidate(&self);

    /// Refuse new operations, cancel in-flight ones, then report
    /// `on_session_invalidated`
    fn invalidate_and_cancel(&self);
}

//! Core types for webimage-dl

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TransportError;

/// Decoded image payload
pub type Image = image::DynamicImage;

/// Opaque identifier the transport assigns to one network operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
    /// Create a new OperationId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for OperationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of an underlying network operation
///
/// `Cancelling` is sticky: once `cancel()` has been called the operation
/// reports `Cancelling` for the rest of its life, including after its terminal
/// event. The processing pipeline relies on this to notice cancellations that
/// arrive after the transfer itself has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// Transferring
    Active,
    /// Created and not yet resumed, or parked by `suspend()`
    Suspended,
    /// `cancel()` was called
    Cancelling,
    /// Terminal event delivered without cancellation
    Completed,
}

impl OperationState {
    /// Convert a compact code (as stored in an atomic) to a state
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => OperationState::Active,
            1 => OperationState::Suspended,
            2 => OperationState::Cancelling,
            _ => OperationState::Completed,
        }
    }

    /// Convert a state to its compact code
    pub const fn to_u8(self) -> u8 {
        match self {
            OperationState::Active => 0,
            OperationState::Suspended => 1,
            OperationState::Cancelling => 2,
            OperationState::Completed => 3,
        }
    }
}

/// Response metadata reported by the transport before the first chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// Final URL of the response
    pub url: Url,
    /// Protocol status code, if the transport has one
    pub status: Option<u16>,
    /// Declared media type
    pub content_type: Option<String>,
    /// Declared payload length
    pub content_length: Option<u64>,
}

/// Answer to the transport's pre-flight question: continue or abort
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Continue receiving the payload
    Allow,
    /// Cancel the operation; it terminates as cancelled
    Cancel,
}

/// Byte progress of a single task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Bytes received so far
    pub received: u64,
    /// Expected total, when the transport knows it
    pub expected: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.expected {
            Some(0) | None => None,
            Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
        }
    }
}

/// Terminal result of one download task - exactly one is delivered per task
#[derive(Debug)]
pub enum DownloadResult {
    /// Aborted by its owner, by the observer veto, or at a pipeline checkpoint
    Cancelled,
    /// Transport failure other than cancellation
    NetworkError(TransportError),
    /// The transfer succeeded but produced zero bytes
    MissingData,
    /// Bytes were received but could not be decoded
    UndecodableData(Bytes),
    /// The (possibly transformed) image and the bytes it was decoded from
    Decoded(Image, Bytes),
}

impl DownloadResult {
    /// Whether an image was produced
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Decoded(..))
    }

    /// Whether the task ended in cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadResult::Cancelled)
    }

    /// The decoded image, if any
    pub fn image(&self) -> Option<&Image> {
        match self {
            DownloadResult::Decoded(image, _) => Some(image),
            _ => None,
        }
    }

    /// The received bytes, if the result carries them
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            DownloadResult::Decoded(_, data) | DownloadResult::UndecodableData(data) => Some(data),
            _ => None,
        }
    }

    /// Short name of the variant, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadResult::Cancelled => "cancelled",
            DownloadResult::NetworkError(_) => "network_error",
            DownloadResult::MissingData => "missing_data",
            DownloadResult::UndecodableData(_) => "undecodable_data",
            DownloadResult::Decoded(..) => "decoded",
        }
    }
}

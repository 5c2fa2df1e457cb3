//! Scenario tests for the downloader, driven through the scripted transport.


use std::sync::{Arc, Mutex, OnceLock};

use crate::downloader::test_helpers::{
    Invalidation, RecordingObserver, assert_never_delivered, capture_result,
    create_test_downloader, next_result,
};
use crate::downloader::{DownloadHandlers, TaskHandle};
use crate::error::{Error, TransportError};
use crate::transport::Operation;
use crate::types::{DownloadResult, Image, OperationId, OperationState};

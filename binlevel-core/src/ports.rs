//! Traits describing store capabilities and shared helper types.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use reqwest::StatusCode;
use serde_json::Error as JsonError;

use crate::model::{BinId, BinReading, NewTrashLevel, TrashLevelRecord};

/// Default upper bound for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to store backends.
pub enum StoreError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Store response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] JsonError),
    /// Store answered with a non-success status.
    #[error("Store rejected request with {status}: {message}")]
    Rejected {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Response body or reason.
        message: String,
    },
    /// Credentials could not be loaded or exchanged for a token.
    #[error("Auth error: {0}")]
    Auth(String),
    /// Store call did not finish in time.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
    /// Internal backend error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
/// Read-only access to the raw telemetry store.
pub trait TelemetryPort: Send + Sync {
    /// List the identifiers of all bins at the store root, in the store's key order.
    ///
    /// An empty or absent root yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the root listing cannot be read.
    async fn list_bins(&self) -> Result<Vec<BinId>, StoreError>;

    /// Read the latest raw value for one bin.
    ///
    /// Returns `Ok(None)` when nothing is stored under the bin's key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store request fails.
    async fn latest_reading(&self, bin: &BinId) -> Result<Option<BinReading>, StoreError>;
}

#[async_trait]
/// Append-only access to the record store.
pub trait RecordPort: Send + Sync {
    /// Append a new record; the store assigns `created_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the write is rejected or fails.
    async fn append(&self, level: &NewTrashLevel) -> Result<TrashLevelRecord, StoreError>;
}

/// Collection of ports implementing one storage backend.
pub struct StorePlugin {
    /// Backend name used in logs.
    pub name: &'static str,
    /// Raw telemetry source.
    pub telemetry: Arc<dyn TelemetryPort>,
    /// Record sink.
    pub records: Arc<dyn RecordPort>,
}

/// Run a store call, failing with [`StoreError::Timeout`] once `limit` elapses.
///
/// # Errors
///
/// Returns the call's own error, or [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_elapsed| StoreError::Timeout(limit))?
}

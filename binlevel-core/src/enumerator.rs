//! Listing of known bins from the telemetry store.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::model::BinId;
use crate::ports::{DEFAULT_STORE_TIMEOUT, StoreError, TelemetryPort, with_timeout};

/// Lists the bins currently present at the telemetry store root.
#[derive(Clone)]
pub struct BinEnumerator {
    telemetry: Arc<dyn TelemetryPort>,
    read_timeout: Duration,
}

impl BinEnumerator {
    /// Create an enumerator reading from the given telemetry store.
    #[must_use]
    pub fn new(telemetry: Arc<dyn TelemetryPort>) -> Self {
        Self {
            telemetry,
            read_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound the root read by `read_timeout`.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// List bin identifiers in the store's native key order.
    ///
    /// A failed read is logged and treated as an empty store.
    pub async fn list_bins(&self) -> Vec<BinId> {
        self.try_list_bins().await.unwrap_or_default()
    }

    /// List bin identifiers, also returning the read failure if there was one.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the root read after logging it.
    pub async fn try_list_bins(&self) -> Result<Vec<BinId>, StoreError> {
        with_timeout(self.read_timeout, self.telemetry.list_bins())
            .await
            .inspect_err(|err| {
                error!(error = %err, "Error fetching bins");
            })
    }
}

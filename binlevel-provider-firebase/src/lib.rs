//! Store adapters for Firebase: Realtime Database telemetry and Firestore records.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use binlevel_core::ports::{StoreError, StorePlugin};

/// Access tokens for the REST calls.
pub mod auth;
/// Firestore record store.
pub mod firestore;
/// Realtime Database telemetry store.
pub mod realtime;

pub use auth::Credentials;
pub use firestore::{FirestoreRecords, FirestoreSettings};
pub use realtime::{RealtimeAuth, RealtimeSettings, RealtimeTelemetry};

/// Build the plugin bundle for the Firebase backend.
#[must_use]
pub fn plugin(
    client: Client,
    realtime: RealtimeSettings,
    firestore: FirestoreSettings,
) -> StorePlugin {
    let telemetry = Arc::new(RealtimeTelemetry::new(client.clone(), realtime));
    let records = Arc::new(FirestoreRecords::new(client, firestore));

    StorePlugin {
        name: "firebase",
        telemetry,
        records,
    }
}

// Small helper to send a request and decode JSON, keeping the body of rejected calls.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, StoreError> {
    let resp = req.send().await.map_err(StoreError::from)?;
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(StoreError::Rejected { status, message });
    }

    let body = resp.bytes().await.map_err(StoreError::from)?;
    serde_json::from_slice(&body).map_err(StoreError::from)
}

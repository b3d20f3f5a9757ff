//! Raw sensor telemetry read through the Realtime Database REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;

use binlevel_core::{
    model::{BinId, BinReading},
    ports::{StoreError, TelemetryPort},
};

use crate::auth::{Credentials, REALTIME_SCOPES};
use crate::fetch_json;

#[derive(Debug, Clone)]
/// How requests to the Realtime Database authenticate.
pub enum RealtimeAuth {
    /// Legacy database secret or ID token, sent as the `auth` query parameter.
    Secret(String),
    /// OAuth2 access token, sent as the `access_token` query parameter.
    AccessToken(Credentials),
}

#[derive(Debug, Clone)]
/// Where and how to reach the Realtime Database.
pub struct RealtimeSettings {
    /// Database root, e.g. `https://<project>-default-rtdb.firebaseio.com/`.
    pub database_url: Url,
    /// Request authentication; `None` for open rules or the emulator.
    pub auth: Option<RealtimeAuth>,
}

/// Telemetry store backed by the Realtime Database; bins are the root keys.
pub struct RealtimeTelemetry {
    client: Client,
    settings: RealtimeSettings,
}

impl RealtimeTelemetry {
    /// Create a telemetry port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: RealtimeSettings) -> Self {
        Self { client, settings }
    }

    async fn get(&self, url: Url) -> Result<RequestBuilder, StoreError> {
        let req = self.client.get(url);
        let req = match &self.settings.auth {
            Some(RealtimeAuth::Secret(secret)) => req.query(&[("auth", secret)]),
            Some(RealtimeAuth::AccessToken(credentials)) => {
                let token = credentials.token(REALTIME_SCOPES).await?;
                req.query(&[("access_token", token)])
            }
            None => req,
        };
        Ok(req)
    }
}

#[async_trait]
impl TelemetryPort for RealtimeTelemetry {
    async fn list_bins(&self) -> Result<Vec<BinId>, StoreError> {
        // shallow=true returns `{"<key>": true, ...}` instead of the whole tree.
        let url = node_url(&self.settings.database_url, "")?;
        let req = self.get(url).await?.query(&[("shallow", "true")]);
        let root = fetch_json::<Value>(req).await?;
        Ok(root_keys(&root))
    }

    async fn latest_reading(&self, bin: &BinId) -> Result<Option<BinReading>, StoreError> {
        let url = node_url(&self.settings.database_url, bin.as_str())?;
        let value = fetch_json::<Value>(self.get(url).await?).await?;
        Ok(reading_from_node(bin, &value))
    }
}

/// REST url of a root child, or of the root itself for an empty key.
pub(crate) fn node_url(database_url: &Url, key: &str) -> Result<Url, StoreError> {
    let mut url = database_url.clone();
    url.path_segments_mut()
        .map_err(|()| StoreError::Internal(format!("Invalid database url: {database_url}")))?
        .pop_if_empty()
        .push(&format!("{key}.json"));
    Ok(url)
}

fn root_keys(root: &Value) -> Vec<BinId> {
    root.as_object()
        .map(|bins| bins.keys().cloned().map(BinId).collect())
        .unwrap_or_default()
}

fn reading_from_node(bin: &BinId, value: &Value) -> Option<BinReading> {
    (!value.is_null()).then(|| BinReading::from_value(bin.clone(), value))
}

//! Credentials attached to Firebase REST calls.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::Deserialize;

use binlevel_core::ports::StoreError;

/// Scopes needed to read the Realtime Database with an OAuth2 access token.
pub const REALTIME_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Scope needed to write Firestore documents.
pub const FIRESTORE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/datastore"];

/// Source of the OAuth2 access token sent with each request.
#[derive(Clone)]
pub enum Credentials {
    /// Fixed token, e.g. one printed by `gcloud` or accepted by an emulator.
    Static(String),
    /// Service account key; tokens are minted on demand and refreshed before expiry.
    ServiceAccount {
        /// Token minting and caching.
        account: Arc<CustomServiceAccount>,
        /// `project_id` field of the key, if present.
        project_id: Option<String>,
    },
}

#[derive(Deserialize)]
struct KeyProject {
    project_id: Option<String>,
}

impl Credentials {
    /// Load a service account from a base64-encoded JSON key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Auth`] when the key is not base64 or not a usable key.
    pub fn from_service_account_key(encoded: &str) -> Result<Self, StoreError> {
        let json = decode_key(encoded)?;
        let project_id = key_project_id(&json)?;
        let account = CustomServiceAccount::from_json(&json)
            .map_err(|err| StoreError::Auth(format!("invalid service account key: {err}")))?;

        Ok(Self::ServiceAccount {
            account: Arc::new(account),
            project_id,
        })
    }

    /// Project the credentials belong to, when known.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::Static(_) => None,
            Self::ServiceAccount { project_id, .. } => project_id.as_deref(),
        }
    }

    /// Current access token for the given scopes.
    ///
    /// Service account tokens are cached by the account and only re-minted
    /// once they are about to expire.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Auth`] when a token cannot be minted.
    pub async fn token(&self, scopes: &[&str]) -> Result<String, StoreError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount { account, .. } => account
                .token(scopes)
                .await
                .map(|token| token.as_str().to_owned())
                .map_err(|err| StoreError::Auth(format!("token request failed: {err}"))),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => formatter.write_str("Static(..)"),
            Self::ServiceAccount { project_id, .. } => formatter
                .debug_struct("ServiceAccount")
                .field("project_id", project_id)
                .finish_non_exhaustive(),
        }
    }
}

fn decode_key(encoded: &str) -> Result<String, StoreError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| StoreError::Auth(format!("service account key is not base64: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| StoreError::Auth(format!("service account key is not UTF-8: {err}")))
}

fn key_project_id(json: &str) -> Result<Option<String>, StoreError> {
    let key: KeyProject = serde_json::from_str(json)
        .map_err(|err| StoreError::Auth(format!("service account key is not JSON: {err}")))?;
    Ok(key.project_id)
}

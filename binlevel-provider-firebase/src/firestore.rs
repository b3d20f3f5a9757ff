//! Fill level records appended through the Firestore REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use binlevel_core::{
    model::{NewTrashLevel, TrashLevelRecord},
    ports::{RecordPort, StoreError},
};

use crate::auth::{Credentials, FIRESTORE_SCOPES};
use crate::fetch_json;

const BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATABASE: &str = "(default)";
const COLLECTION: &str = "trashLevels";
const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Debug, Clone)]
/// Where and how to reach Firestore.
pub struct FirestoreSettings {
    /// Google Cloud project id.
    pub project_id: String,
    /// Source of the bearer token.
    pub credentials: Credentials,
    /// API root; override to target the emulator.
    pub base_url: String,
    /// Database id inside the project.
    pub database: String,
}

impl FirestoreSettings {
    /// Settings for the project's default database on the public endpoint.
    #[must_use]
    pub fn new<P: Into<String>>(project_id: P, credentials: Credentials) -> Self {
        Self {
            project_id: project_id.into(),
            credentials,
            base_url: BASE_URL.to_owned(),
            database: DEFAULT_DATABASE.to_owned(),
        }
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }
}

/// Commit request carrying a single create-with-server-timestamp write.
#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    update: Document,
    current_document: Precondition,
    update_transforms: Vec<FieldTransform>,
}

#[derive(Debug, Serialize)]
struct Document {
    name: String,
    fields: Fields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Fields {
    bin: StringValue,
    trash_level: IntegerValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StringValue {
    string_value: String,
}

/// Firestore encodes 64-bit integers as JSON strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IntegerValue {
    integer_value: String,
}

#[derive(Debug, Serialize)]
struct Precondition {
    exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform {
    field_path: &'static str,
    set_to_server_value: &'static str,
}

/// Response from `documents:commit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
    commit_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<TransformResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformResult {
    timestamp_value: Option<DateTime<Utc>>,
}

/// Record store appending documents to the `trashLevels` collection.
pub struct FirestoreRecords {
    client: Client,
    settings: FirestoreSettings,
}

impl FirestoreRecords {
    /// Create a record port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: FirestoreSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl RecordPort for FirestoreRecords {
    async fn append(&self, level: &NewTrashLevel) -> Result<TrashLevelRecord, StoreError> {
        let database = self.settings.database_path();
        let document_id = Uuid::new_v4().simple().to_string();
        let body = commit_request(&database, &document_id, level);
        let token = self.settings.credentials.token(FIRESTORE_SCOPES).await?;

        let req = self
            .client
            .post(format!("{}/{database}/documents:commit", self.settings.base_url))
            .bearer_auth(token)
            .json(&body);

        let resp = fetch_json::<CommitResponse>(req).await?;

        Ok(TrashLevelRecord {
            bin: level.bin.clone(),
            trash_level: level.trash_level,
            created_at: server_timestamp(&resp),
        })
    }
}

fn commit_request(database: &str, document_id: &str, level: &NewTrashLevel) -> CommitRequest {
    CommitRequest {
        writes: vec![Write {
            update: Document {
                name: format!("{database}/documents/{COLLECTION}/{document_id}"),
                fields: Fields {
                    bin: StringValue {
                        string_value: level.bin.to_string(),
                    },
                    trash_level: IntegerValue {
                        integer_value: level.trash_level.percent().to_string(),
                    },
                },
            },
            current_document: Precondition { exists: false },
            update_transforms: vec![FieldTransform {
                field_path: CREATED_AT_FIELD,
                set_to_server_value: "REQUEST_TIME",
            }],
        }],
    }
}

// The REQUEST_TIME transform result equals the commit time; prefer it when present.
fn server_timestamp(resp: &CommitResponse) -> DateTime<Utc> {
    resp.write_results
        .first()
        .and_then(|result| result.transform_results.first())
        .and_then(|transform| transform.timestamp_value)
        .unwrap_or(resp.commit_time)
}

#[cfg(test)]
mod tests {
    use binlevel_core::model::{BinId, TrashLevel};
    use serde_json::json;

    use super::*;

    #[test]
    fn commit_request_sets_server_timestamp() {
        let level = NewTrashLevel {
            bin: BinId::from("bin1"),
            trash_level: TrashLevel::new(92).expect("valid level"),
        };
        let body = serde_json::to_value(commit_request(
            "projects/demo/databases/(default)",
            "abc123",
            &level,
        ))
        .expect("serialize");

        assert_eq!(
            body,
            json!({
                "writes": [{
                    "update": {
                        "name": "projects/demo/databases/(default)/documents/trashLevels/abc123",
                        "fields": {
                            "bin": { "stringValue": "bin1" },
                            "trashLevel": { "integerValue": "92" }
                        }
                    },
                    "currentDocument": { "exists": false },
                    "updateTransforms": [{
                        "fieldPath": "createdAt",
                        "setToServerValue": "REQUEST_TIME"
                    }]
                }]
            })
        );
    }

    #[test]
    fn settings_default_to_public_endpoint() {
        let settings = FirestoreSettings::new("demo", Credentials::Static("token".to_owned()));
        assert_eq!(settings.base_url, "https://firestore.googleapis.com/v1");
        assert_eq!(settings.database_path(), "projects/demo/databases/(default)");
    }

    #[test]
    fn timestamp_prefers_transform_result() {
        let resp: CommitResponse = serde_json::from_value(json!({
            "writeResults": [{
                "updateTime": "2024-05-01T10:00:00.500Z",
                "transformResults": [{ "timestampValue": "2024-05-01T10:00:00.250Z" }]
            }],
            "commitTime": "2024-05-01T10:00:00.500Z"
        }))
        .expect("decode");

        assert_eq!(
            server_timestamp(&resp).to_rfc3339(),
            "2024-05-01T10:00:00.250+00:00"
        );
    }

    #[test]
    fn timestamp_falls_back_to_commit_time() {
        let resp: CommitResponse = serde_json::from_value(json!({
            "commitTime": "2024-05-01T10:00:00Z"
        }))
        .expect("decode");

        assert_eq!(server_timestamp(&resp).to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}

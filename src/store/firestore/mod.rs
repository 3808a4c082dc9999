/*!
 * # Firestore REST backend
 *
 * [`DocumentStore`] implementation over the Firestore REST v1 API:
 *
 * - `GET documents/{collection}/{id}` for direct reads
 * - `documents:runQuery` for equality queries
 * - `documents:commit` for creates, merge updates and deletes, with
 *   `REQUEST_TIME` transforms for server timestamps and `currentDocument`
 *   preconditions
 *
 * Requests carry an OAuth2 bearer token obtained from a service-account
 * credential, or the fixed `owner` token when talking to the emulator.
 */

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{Document, DocumentStore, Fields, Query, StoreError, WriteResult};

pub mod auth;
pub mod wire;

pub use auth::{CredentialError, ServiceAccountCredential, DATASTORE_SCOPE};

use auth::TokenSource;
use wire::{CommitResponse, DocumentResource, RunQueryItem};

pub const DEFAULT_API_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_DATABASE_ID: &str = "(default)";
const EMULATOR_TOKEN: &str = "owner";

/// Connection settings for [`FirestoreStore`].
#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    pub api_base_url: String,
    pub database_id: String,
    /// Transport-level timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for FirestoreOptions {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct FirestoreStore {
    http: reqwest::Client,
    tokens: TokenSource,
    project_id: String,
    database_id: String,
    api_base_url: String,
}

impl FirestoreStore {
    /// Client authenticated with a service-account credential. `project_id`
    /// defaults to the credential's own project.
    pub fn new(
        credential: ServiceAccountCredential,
        project_id: Option<String>,
        options: FirestoreOptions,
    ) -> Result<Self, StoreError> {
        let project_id = project_id.unwrap_or_else(|| credential.project_id.clone());
        Self::build(TokenSource::service_account(credential), project_id, options)
    }

    /// Client for a local emulator at `host` (`host:port`), over plain HTTP.
    pub fn emulator(
        host: &str,
        project_id: impl Into<String>,
        options: FirestoreOptions,
    ) -> Result<Self, StoreError> {
        let options = FirestoreOptions {
            api_base_url: format!("http://{}/v1", host.trim_end_matches('/')),
            ..options
        };
        Self::build(
            TokenSource::Static(EMULATOR_TOKEN.to_string()),
            project_id.into(),
            options,
        )
    }

    fn build(
        tokens: TokenSource,
        project_id: String,
        options: FirestoreOptions,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            tokens,
            project_id,
            database_id: options.database_id,
            api_base_url: options.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database_id)
    }

    fn document_name(&self, collection: &str, document_id: &str) -> String {
        format!("{}/documents/{}/{}", self.database_path(), collection, document_id)
    }

    fn documents_url(&self) -> String {
        format!("{}/{}/documents", self.api_base_url, self.database_path())
    }

    /// Exchanges the credential for an access token, or returns the cached one.
    pub async fn access_token(&self) -> Result<String, StoreError> {
        self.tokens.token(&self.http).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let token = self.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(wire::map_error(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Encoding(e.to_string()))
    }

    async fn commit(&self, write: Value) -> Result<WriteResult, StoreError> {
        let url = format!("{}:commit", self.documents_url());
        let response = self
            .send(self.http.post(url).json(&json!({ "writes": [write] })))
            .await?;
        let commit: CommitResponse = Self::read_json(response).await?;
        Ok(WriteResult {
            commit_time: commit.commit_time()?,
        })
    }

    fn update_write(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
        exists: bool,
    ) -> Result<Value, StoreError> {
        let (values, transforms) = wire::split_transforms(fields);
        let mask: Vec<String> = values.keys().map(|f| wire::quote_field_path(f)).collect();
        let mut write = json!({
            "update": {
                "name": self.document_name(collection, document_id),
                "fields": wire::encode_fields(&values)?,
            },
            "currentDocument": { "exists": exists },
        });
        // A create replaces the whole (absent) document; an update merges.
        if exists {
            write["updateMask"] = json!({ "fieldPaths": mask });
        }
        if !transforms.is_empty() {
            write["updateTransforms"] = json!(wire::transforms_json(&transforms));
        }
        Ok(write)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    #[instrument(skip(self, fields))]
    async fn create(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, StoreError> {
        let write = self.update_write(collection, document_id, fields, false)?;
        self.commit(write).await
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let url = format!("{}/{}/{}", self.documents_url(), collection, document_id);
        let response = self.send(self.http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resource: DocumentResource = Self::read_json(response).await?;
        resource.into_document().map(Some)
    }

    #[instrument(skip(self, fields))]
    async fn update(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, StoreError> {
        let write = self.update_write(collection, document_id, fields, true)?;
        self.commit(write).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, document_id: &str) -> Result<(), StoreError> {
        let write = json!({ "delete": self.document_name(collection, document_id) });
        self.commit(write).await.map(|_| ())
    }

    #[instrument(skip(self), fields(collection = query.collection_name()))]
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}:runQuery", self.documents_url());
        let body = wire::structured_query(query)?;
        let response = self.send(self.http.post(url).json(&body)).await?;
        let items: Vec<RunQueryItem> = Self::read_json(response).await?;
        let documents = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(DocumentResource::into_document)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = documents.len(), "Query returned documents");
        Ok(documents)
    }

    async fn probe(&self) -> Result<(), StoreError> {
        self.access_token().await?;
        self.query(&Query::collection("categories").limit(1))
            .await
            .map(|_| ())
    }
}

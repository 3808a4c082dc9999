/*!
 * # Document store abstraction
 *
 * The persistence layer talks to a hierarchical document store that offers
 * equality filters and limits, and nothing else the repositories rely on:
 * no joins, no substring search, no cross-field predicates, no aggregation.
 * Anything beyond equality narrowing is done client-side by the repositories.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

pub mod firestore;
pub mod handle;
pub mod memory;
mod value;

pub use handle::StoreHandle;
pub use memory::InMemoryStore;
pub use value::{FieldValue, Fields};

/// Length of generated document ids.
pub const AUTO_ID_LENGTH: usize = 20;

/// Errors reported by a [`DocumentStore`] backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: String, message: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: String,
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Server commit time; every [`FieldValue::ServerTimestamp`] in the write
    /// resolved to this instant.
    pub commit_time: DateTime<Utc>,
}

/// Equality-only query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<(String, FieldValue)>,
    limit: Option<u32>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[(String, FieldValue)] {
        &self.filters
    }

    pub fn max_results(&self) -> Option<u32> {
        self.limit
    }

    /// Evaluates the filters against a field map; a missing field never matches.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|(field, expected)| {
            fields
                .get(field)
                .map_or(false, |actual| actual.query_eq(expected))
        })
    }
}

/// Backend trait implemented by the Firestore client and the in-memory store.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Allocates a fresh opaque document id without touching the store.
    fn allocate_id(&self) -> String {
        auto_id()
    }

    /// Creates a document; fails with `AlreadyExists` if the id is taken.
    async fn create(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, StoreError>;

    async fn get(&self, collection: &str, document_id: &str)
        -> Result<Option<Document>, StoreError>;

    /// Merges `fields` into an existing document; fails with `NotFound` if it
    /// does not exist. Fields not named are left untouched.
    async fn update(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, StoreError>;

    async fn delete(&self, collection: &str, document_id: &str) -> Result<(), StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Runs a cheap round-trip to verify the backend is reachable.
    async fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Releases backend resources. Best effort.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Random 20-character alphanumeric id, the same shape the store generates.
pub fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

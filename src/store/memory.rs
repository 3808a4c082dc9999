use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Document, DocumentStore, FieldValue, Fields, Query, StoreError, WriteResult};

type Collection = BTreeMap<String, Fields>;

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    last_commit: Option<DateTime<Utc>>,
}

impl State {
    /// Commit times are strictly increasing, even when the wall clock is not.
    fn next_commit_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let commit = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(commit);
        commit
    }
}

/// In-process document store with the same semantics the repositories rely on
/// from Firestore: create preconditions, merge updates, server timestamps and
/// numeric equality across integer and double values.
///
/// Used by the test suite and by embedders that want a scratch store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    fault: Mutex<Option<StoreError>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next store call fail with `error`.
    pub fn fail_next(&self, error: StoreError) {
        if let Ok(mut slot) = self.fault.lock() {
            *slot = Some(error);
        }
    }

    /// Writes a document verbatim, bypassing timestamp resolution. Used to seed
    /// documents shaped by older writers.
    pub async fn insert_raw(&self, collection: &str, document_id: &str, fields: Fields) {
        let mut state = self.state.write().await;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(document_id.to_string(), fields);
    }

    /// Raw field map of a document, if present.
    pub async fn raw(&self, collection: &str, document_id: &str) -> Option<Fields> {
        let state = self.state.read().await;
        state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(document_id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        let state = self.state.read().await;
        state.collections.get(collection).map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    fn take_fault(&self) -> Result<(), StoreError> {
        let mut slot = self
            .fault
            .lock()
            .map_err(|_| StoreError::Transport("fault injection lock poisoned".into()))?;
        match slot.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn resolve_timestamps(fields: Fields, commit_time: DateTime<Utc>) -> Fields {
    fields
        .into_iter()
        .map(|(name, value)| match value {
            FieldValue::ServerTimestamp => (name, FieldValue::Timestamp(commit_time)),
            other => (name, other),
        })
        .collect()
}

fn path(collection: &str, document_id: &str) -> String {
    format!("{}/{}", collection, document_id)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, StoreError> {
        self.take_fault()?;
        let mut state = self.state.write().await;
        let exists = state
            .collections
            .get(collection)
            .map_or(false, |docs| docs.contains_key(document_id));
        if exists {
            return Err(StoreError::AlreadyExists(path(collection, document_id)));
        }
        let commit_time = state.next_commit_time();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(
                document_id.to_string(),
                resolve_timestamps(fields, commit_time),
            );
        debug!(collection, document_id, "created document");
        Ok(WriteResult { commit_time })
    }

    async fn get(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.take_fault()?;
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(document_id))
            .map(|fields| Document::new(collection, document_id, fields.clone())))
    }

    async fn update(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, StoreError> {
        self.take_fault()?;
        let mut state = self.state.write().await;
        let commit_time = state.next_commit_time();
        let existing = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(document_id))
            .ok_or_else(|| StoreError::NotFound(path(collection, document_id)))?;
        existing.extend(resolve_timestamps(fields, commit_time));
        Ok(WriteResult { commit_time })
    }

    async fn delete(&self, collection: &str, document_id: &str) -> Result<(), StoreError> {
        self.take_fault()?;
        let mut state = self.state.write().await;
        if let Some(docs) = state.collections.get_mut(collection) {
            docs.remove(document_id);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.take_fault()?;
        let state = self.state.read().await;
        let Some(docs) = state.collections.get(query.collection_name()) else {
            return Ok(Vec::new());
        };
        let limit = query.max_results().map_or(usize::MAX, |n| n as usize);
        Ok(docs
            .iter()
            .filter(|(_, fields)| query.matches(fields))
            .take(limit)
            .map(|(id, fields)| Document::new(query.collection_name(), id.clone(), fields.clone()))
            .collect())
    }
}

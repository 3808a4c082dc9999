use metrics::{counter, histogram};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::{Document, DocumentStore, Fields, Query, StoreError, WriteResult};
use crate::errors::ServiceError;

/// Default per-operation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared, cloneable handle to a document store.
///
/// Every call runs under the handle's deadline and records request metrics.
/// All clones share one open flag: once any clone is closed, every operation
/// through any of them fails with [`ServiceError::NotInitialized`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    store: Arc<dyn DocumentStore>,
    open: Arc<AtomicBool>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            open: Arc::new(AtomicBool::new(true)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Same store and open flag, different deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            store: Arc::clone(&self.store),
            open: Arc::clone(&self.open),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Marks the handle closed. Returns the underlying store if this call
    /// performed the transition, so the caller can release it.
    pub fn close(&self) -> Option<Arc<dyn DocumentStore>> {
        self.open
            .swap(false, Ordering::SeqCst)
            .then(|| Arc::clone(&self.store))
    }

    pub fn allocate_id(&self) -> Result<String, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.allocate_id())
    }

    pub async fn create(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, ServiceError> {
        self.execute("create", self.store.create(collection, document_id, fields))
            .await
    }

    pub async fn get(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<Document>, ServiceError> {
        self.execute("get", self.store.get(collection, document_id))
            .await
    }

    pub async fn update(
        &self,
        collection: &str,
        document_id: &str,
        fields: Fields,
    ) -> Result<WriteResult, ServiceError> {
        self.execute("update", self.store.update(collection, document_id, fields))
            .await
    }

    pub async fn delete(&self, collection: &str, document_id: &str) -> Result<(), ServiceError> {
        self.execute("delete", self.store.delete(collection, document_id))
            .await
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Document>, ServiceError> {
        self.execute("query", self.store.query(query)).await
    }

    pub async fn probe(&self) -> Result<(), ServiceError> {
        self.execute("probe", self.store.probe()).await
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ServiceError::NotInitialized)
        }
    }

    /// Runs one store round-trip with deadline, metrics and logging.
    async fn execute<T, Fut>(&self, operation: &'static str, fut: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.ensure_open()?;
        let start = Instant::now();

        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::NotFound(path))) => Err(ServiceError::NotFound(path)),
            Ok(Err(e)) => {
                error!(operation, error = %e, "Store operation failed");
                counter!("stockkeeper_store.request.error", 1, "operation" => operation);
                Err(ServiceError::from(e))
            }
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "Store operation timed out");
                counter!("stockkeeper_store.request.timeout", 1, "operation" => operation);
                Err(ServiceError::Transport(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                )))
            }
        };

        let elapsed = start.elapsed();
        histogram!("stockkeeper_store.request.duration", elapsed, "operation" => operation);
        debug!(operation, duration = ?elapsed, "Store operation finished");

        result
    }
}

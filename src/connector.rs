/*!
 * # Connector
 *
 * Owns the single store handle of the process. The handle is created once
 * from a service-account credential (or an emulator host), verified by
 * obtaining an access token, and shared by every repository until
 * [`Connector::shutdown`] closes it.
 *
 * Repositories take an explicit [`StoreHandle`]; [`global`] exists for the
 * surrounding application.
 */

use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::store::firestore::{
    CredentialError, FirestoreOptions, FirestoreStore, ServiceAccountCredential,
};
use crate::store::{DocumentStore, StoreHandle};

/// Project used against the emulator when none is configured.
const EMULATOR_PROJECT: &str = "demo-stockkeeper";

/// Fatal initialization errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Credential file {path} could not be read: {source}")]
    MissingCredential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file {path} is malformed: {reason}")]
    MalformedCredential { path: PathBuf, reason: String },

    #[error("Document store unreachable: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug)]
struct Connection {
    handle: StoreHandle,
    project_id: Option<String>,
    lookup_cache_ttl: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Connector {
    slot: RwLock<Option<Connection>>,
    init: Mutex<()>,
}

static GLOBAL: Lazy<Connector> = Lazy::new(Connector::new);

/// Process-global connector.
pub fn global() -> &'static Connector {
    &GLOBAL
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<StoreHandle> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|conn| conn.handle.clone())
            .filter(StoreHandle::is_open)
    }

    fn set(&self, connection: Connection) -> StoreHandle {
        let handle = connection.handle.clone();
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
        handle
    }

    /// Connects to Firestore as described by `config`. Idempotent: once a
    /// handle is live, later calls return it without reconnecting.
    #[instrument(skip(self, config))]
    pub async fn initialize(&self, config: &AppConfig) -> Result<StoreHandle, ConnectorError> {
        let _guard = self.init.lock().await;
        if let Some(handle) = self.current() {
            info!("Document store already initialized");
            return Ok(handle);
        }

        config
            .validate()
            .map_err(|e| ConnectorError::Config(e.to_string()))?;

        let options = FirestoreOptions {
            api_base_url: config.api_base_url.clone(),
            database_id: config.database_id.clone(),
            request_timeout: config.request_timeout(),
        };

        let store = match config.emulator_host() {
            Some(host) => {
                let project = config
                    .project_id
                    .clone()
                    .unwrap_or_else(|| EMULATOR_PROJECT.to_string());
                info!(%host, %project, "Connecting to Firestore emulator");
                FirestoreStore::emulator(&host, project, options)
            }
            None => {
                let credential = load_credential(config.credentials_path())?;
                info!(
                    project = %credential.project_id,
                    client_email = %credential.client_email,
                    "Loaded service-account credential"
                );
                FirestoreStore::new(credential, config.project_id.clone(), options)
            }
        }
        .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        store
            .access_token()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        let project_id = store.project_id().to_string();
        info!(project = %project_id, "Document store initialized");
        Ok(self.set(Connection {
            handle: StoreHandle::new(Arc::new(store)).with_timeout(config.request_timeout()),
            project_id: Some(project_id),
            lookup_cache_ttl: config.lookup_cache_ttl(),
        }))
    }

    /// Installs an already-built store. Returns the live handle instead if one
    /// exists.
    pub async fn install(&self, store: Arc<dyn DocumentStore>) -> StoreHandle {
        let _guard = self.init.lock().await;
        if let Some(handle) = self.current() {
            return handle;
        }
        info!("Document store installed");
        self.set(Connection {
            handle: StoreHandle::new(store),
            project_id: None,
            lookup_cache_ttl: None,
        })
    }

    /// Live handle, or `NotInitialized` before initialization and after
    /// shutdown.
    pub fn handle(&self) -> Result<StoreHandle, ServiceError> {
        self.current().ok_or(ServiceError::NotInitialized)
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    /// Project the live handle talks to, if it is a Firestore connection.
    pub fn project_id(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|conn| conn.project_id.clone())
    }

    pub fn lookup_cache_ttl(&self) -> Option<Duration> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|conn| conn.lookup_cache_ttl)
    }

    /// Round-trip through the live handle.
    pub async fn probe(&self) -> Result<(), ServiceError> {
        self.handle()?.probe().await
    }

    /// Closes the handle; every clone of it fails with `NotInitialized` from
    /// now on. Releasing the backend is best effort.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _guard = self.init.lock().await;
        let connection = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(connection) = connection else {
            return;
        };
        if let Some(store) = connection.handle.close() {
            if let Err(e) = store.close().await {
                warn!(error = %e, "Failed to release document store");
            }
        }
        info!("Document store shut down");
    }
}

fn load_credential(path: PathBuf) -> Result<ServiceAccountCredential, ConnectorError> {
    ServiceAccountCredential::from_file(&path).map_err(|e| match e {
        CredentialError::Missing { source, .. } => {
            ConnectorError::MissingCredential { path, source }
        }
        CredentialError::Malformed(reason) => ConnectorError::MalformedCredential { path, reason },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn handle_before_initialization_is_not_initialized() {
        let connector = Connector::new();
        assert_eq!(connector.handle().unwrap_err().kind(), ErrorKind::NotInitialized);
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn second_install_returns_existing_handle() {
        let connector = Connector::new();
        let first = Arc::new(InMemoryStore::new());
        let handle = connector.install(first.clone()).await;
        handle
            .create("categories", "a", Default::default())
            .await
            .unwrap();

        let again = connector.install(Arc::new(InMemoryStore::new())).await;
        assert!(again.get("categories", "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shutdown_invalidates_outstanding_handles() {
        let connector = Connector::new();
        let handle = connector.install(Arc::new(InMemoryStore::new())).await;
        connector.shutdown().await;

        assert!(!connector.is_connected());
        let err = handle.get("categories", "a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);

        // Shutting down twice is harmless.
        connector.shutdown().await;
    }
}

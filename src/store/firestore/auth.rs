/*!
 * # Service-account authentication
 *
 * Exchanges a service-account credential for OAuth2 access tokens using the
 * JWT-bearer grant: an RS256-signed assertion for the account's
 * `client_email` is posted to the credential's `token_uri`, and the returned
 * token is cached until shortly before it expires.
 */

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::StoreError;

/// OAuth2 scope granting Firestore access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file {path} could not be read: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed credential: {0}")]
    Malformed(String),
}

/// Parsed service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountCredential {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountCredential {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parses and checks a key file: the account type must be
    /// `service_account` when present and the private key must be valid PEM.
    pub fn from_json(raw: &str) -> Result<Self, CredentialError> {
        let credential: Self =
            serde_json::from_str(raw).map_err(|e| CredentialError::Malformed(e.to_string()))?;

        if let Some(kind) = credential.kind.as_deref() {
            if kind != "service_account" {
                return Err(CredentialError::Malformed(format!(
                    "expected a service_account credential, got {}",
                    kind
                )));
            }
        }
        if credential.project_id.trim().is_empty() {
            return Err(CredentialError::Malformed("project_id is empty".into()));
        }
        if credential.client_email.trim().is_empty() {
            return Err(CredentialError::Malformed("client_email is empty".into()));
        }
        credential.signing_key()?;
        Ok(credential)
    }

    fn signing_key(&self) -> Result<EncodingKey, CredentialError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| CredentialError::Malformed(format!("private_key: {}", e)))
    }

    fn assertion(&self) -> Result<String, StoreError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let key = self
            .signing_key()
            .map_err(|e| StoreError::Unauthorized(e.to_string()))?;
        encode(&header, &claims, &key).map_err(|e| StoreError::Unauthorized(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Source of bearer tokens for Firestore requests.
#[derive(Debug)]
pub(crate) enum TokenSource {
    ServiceAccount {
        credential: ServiceAccountCredential,
        cache: Mutex<Option<CachedToken>>,
    },
    /// Fixed token, as accepted by the local emulator.
    Static(String),
}

impl TokenSource {
    pub fn service_account(credential: ServiceAccountCredential) -> Self {
        Self::ServiceAccount {
            credential,
            cache: Mutex::new(None),
        }
    }

    pub async fn token(&self, http: &reqwest::Client) -> Result<String, StoreError> {
        let (credential, cache) = match self {
            Self::Static(token) => return Ok(token.clone()),
            Self::ServiceAccount { credential, cache } => (credential, cache),
        };

        let mut cached = cache.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!(client_email = %credential.client_email, "Requesting access token");
        let assertion = credential.assertion()?;
        let response = http
            .post(&credential.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unauthorized(format!(
                "token endpoint returned {}: {}",
                status,
                body.trim()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unauthorized(format!("bad token response: {}", e)))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let refresh_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);

        info!(client_email = %credential.client_email, expires_in = ?lifetime, "Obtained access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });
        Ok(token.access_token)
    }
}

use serde::Serialize;

use crate::mapper::DecodeError;
use crate::store::StoreError;

/// Errors surfaced by the repositories.
///
/// `DecodeFailed` is internal: listings swallow it per document and it only
/// reaches callers when it blocks a single-document read.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Document store is not initialized")]
    NotInitialized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("In use: {0}")]
    InUse(String),

    #[error("Validation error: {0}")]
    ValidationFailed(String),

    #[error("Decode error: {0}")]
    DecodeFailed(
        #[from]
        #[serde(skip)]
        DecodeError,
    ),
}

/// Fieldless view of [`ServiceError`] for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInitialized,
    Transport,
    NotFound,
    InUse,
    ValidationFailed,
    DecodeFailed,
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationFailed(err.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::Transport(other.to_string()),
        }
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::Transport(_) => ErrorKind::Transport,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InUse(_) => ErrorKind::InUse,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::DecodeFailed(_) => ErrorKind::DecodeFailed,
        }
    }

    /// Whether a caller may reasonably retry the same call later.
    /// The repository itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn not_found(entity: &str, id: i32) -> Self {
        ServiceError::NotFound(format!("{} with ID {} not found", entity, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationFailed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: ServiceError = StoreError::NotFound("products/abc".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn other_store_errors_map_to_transport() {
        let cases = [
            StoreError::Transport("connection reset".into()),
            StoreError::Unauthorized("token expired".into()),
            StoreError::Rejected {
                status: "FAILED_PRECONDITION".into(),
                message: "index missing".into(),
            },
            StoreError::AlreadyExists("products/abc".into()),
        ];
        for case in cases {
            let err: ServiceError = case.into();
            assert_eq!(err.kind(), ErrorKind::Transport);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn error_messages_carry_context() {
        assert_eq!(
            ServiceError::not_found("Product", 42).to_string(),
            "Not found: Product with ID 42 not found"
        );
        assert_eq!(
            ServiceError::validation("name must not be empty").to_string(),
            "Validation error: name must not be empty"
        );
        assert!(!ServiceError::InUse("category 7".into()).is_retryable());
    }
}

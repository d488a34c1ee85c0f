//! Error types for the live-query cache and the stores it talks to.

use thiserror::Error;

/// Failure reported by a reactive document store.
///
/// These never cross the subscribe boundary directly: the caches convert them
/// into [`PermissionError`](crate::permission::PermissionError) values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Missing or insufficient permissions for {operation} on {path}")]
    PermissionDenied { operation: String, path: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// True if the store rejected the request on access-control grounds.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }
}

/// Main error type for crate operations that can fail synchronously.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Decode(e.to_string())
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, CacheError>;

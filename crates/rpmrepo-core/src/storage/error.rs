//! Storage error types.

use thiserror::Error;

/// Object store failures.
///
/// A missing object is not an error: [`ObjectStore::get`](super::ObjectStore::get)
/// reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading a body or a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend call failed.
    #[error("{backend} {operation} failed for {bucket}/{key}: {source}")]
    Backend {
        /// Backend name, as in [`ObjectStore::backend_name`](super::ObjectStore::backend_name).
        backend: &'static str,
        /// The call that failed.
        operation: &'static str,
        /// Bucket addressed.
        bucket: String,
        /// Key addressed.
        key: String,
        /// Backend failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The key cannot be mapped onto the backend.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The backend is misconfigured or answered unexpectedly.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Wrap a backend-specific failure with the operation it belongs to.
    pub fn backend(
        backend: &'static str,
        operation: &'static str,
        bucket: &str,
        key: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            backend,
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

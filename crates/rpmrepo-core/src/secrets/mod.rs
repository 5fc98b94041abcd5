//! Secret retrieval for signing material.

#[cfg(feature = "aws")]
mod aws;
mod file;

#[cfg(feature = "aws")]
pub use aws::AwsSecretStore;
pub use file::FileSecretStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Secret store failures.
#[derive(Debug, Error)]
pub enum SecretError {
    /// No secret has this id.
    #[error("secret {0} not found")]
    NotFound(String),

    /// The secret is blank after newline trimming.
    #[error("secret {0} is empty")]
    Empty(String),

    /// The id cannot name a secret, e.g. it contains a path separator.
    #[error("invalid secret id {0:?}")]
    InvalidId(String),

    /// The backend call failed.
    #[error("failed to fetch secret {id}: {source}")]
    Backend {
        /// Secret id.
        id: String,
        /// Backend failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Source of secret values by identifier.
#[async_trait]
pub trait SecretStore: Send + Sync + fmt::Debug {
    /// Fetch the raw bytes of `id`.
    ///
    /// # Errors
    ///
    /// [`SecretError::NotFound`] for unknown ids, otherwise backend failures.
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SecretError>;

    /// Fetch `id` with trailing newlines removed.
    ///
    /// # Errors
    ///
    /// As [`fetch`](Self::fetch), plus [`SecretError::Empty`] for blank values.
    async fn get(&self, id: &str) -> Result<Vec<u8>, SecretError> {
        let value = strip_trailing_newlines(self.fetch(id).await?);
        if value.is_empty() {
            return Err(SecretError::Empty(id.to_string()));
        }
        tracing::debug!(secret = id, bytes = value.len(), "loaded secret");
        Ok(value)
    }
}

/// Remove any run of `\n` / `\r\n` at the end of a value.
pub fn strip_trailing_newlines(mut value: Vec<u8>) -> Vec<u8> {
    while matches!(value.last(), Some(b'\n' | b'\r')) {
        value.pop();
    }
    value
}

/// In-memory secrets, for tests and local runs.
#[derive(Default, Clone)]
pub struct MemorySecretStore {
    values: HashMap<String, Vec<u8>>,
}

impl fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.values.keys().collect();
        ids.sort();
        f.debug_struct("MemorySecretStore").field("ids", &ids).finish()
    }
}

impl MemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a secret.
    #[must_use]
    pub fn with(mut self, id: &str, value: impl Into<Vec<u8>>) -> Self {
        self.values.insert(id.to_string(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SecretError> {
        self.values
            .get(id)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(id.to_string()))
    }
}

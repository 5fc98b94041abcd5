//! Object store facade.
//!
//! Every backend speaks in `(bucket, key)` pairs and streams bodies through
//! [`ObjectReader`]. Absence is an explicit `Ok(None)` from [`ObjectStore::get`]
//! because a repository that was never published is a valid starting state.

mod error;
pub mod filesystem;
pub mod memory;
#[cfg(feature = "aws")]
pub mod s3;

pub use error::{StorageError, StorageResult};
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
#[cfg(feature = "aws")]
pub use s3::{S3Config, S3Store};

use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streamed object body.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Content type of compressed index documents.
pub const CONTENT_TYPE_GZIP: &str = "application/x-gzip";
/// Content type of the uncompressed index-of-indexes.
pub const CONTENT_TYPE_XML: &str = "text/xml";
/// Content type of package artifacts.
pub const CONTENT_TYPE_RPM: &str = "application/x-rpm";
/// Content type of detached signatures.
pub const CONTENT_TYPE_SIGNATURE: &str = "application/octet-stream";

/// Bucket-scoped object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Open an object for streaming. `Ok(None)` when the key does not exist.
    ///
    /// # Errors
    ///
    /// Backend failures other than absence.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectReader>>;

    /// Store `body` under `key`, replacing any existing object.
    ///
    /// Returns the number of bytes written. The body is streamed; backends
    /// hold at most one upload part in memory.
    ///
    /// # Errors
    ///
    /// Reading the body or writing the object failed. The previous object,
    /// if any, is left in place.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectReader,
        content_type: &str,
    ) -> StorageResult<u64>;

    /// Remove an object. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// A fully qualified object address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    /// Bucket name.
    pub bucket: String,
    /// Key within the bucket.
    pub key: String,
}

impl ObjectLocation {
    /// Address `key` in `bucket`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

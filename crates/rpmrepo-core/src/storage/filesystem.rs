//! Local filesystem storage backend.
//!
//! Objects live at `<root>/<bucket>/<key>`. Writes go to a temporary file in
//! the destination directory and are renamed into place, so readers never see
//! a partially written object.

use super::{ObjectReader, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `bucket/key` to a path, rejecting traversal.
    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StorageError::InvalidKey(format!("invalid bucket name: {bucket}")));
        }
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!("invalid object key: {key}")));
        }
        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    #[instrument(skip(self), fields(backend = "fs"))]
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectReader>> {
        let path = self.object_path(bucket, key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Some(Box::pin(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, body), fields(backend = "fs"))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectReader,
        content_type: &str,
    ) -> StorageResult<u64> {
        let path = self.object_path(bucket, key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?
            .to_path_buf();
        fs::create_dir_all(&parent).await?;

        let temp = tempfile::Builder::new()
            .prefix(".rpmrepo-")
            .tempfile_in(&parent)?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = fs::File::from_std(std_file);

        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp_path.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        tracing::debug!(bytes = written, "stored object");
        Ok(written)
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "fs"
    }
}

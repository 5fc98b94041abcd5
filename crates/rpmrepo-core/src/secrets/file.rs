use super::{SecretError, SecretStore};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

/// Secrets stored one per file in a directory; the id is the file name.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Read secrets from files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SecretError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(SecretError::InvalidId(id.to_string()));
        }
        match tokio::fs::read(self.dir.join(id)).await {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(SecretError::NotFound(id.to_string()))
            }
            Err(err) => Err(SecretError::Backend {
                id: id.to_string(),
                source: Box::new(err),
            }),
        }
    }
}

//! Pipeline error taxonomy.

use crate::config::ConfigError;
use crate::events::EventError;
use crate::package::ParseError;
use crate::secrets::SecretError;
use crate::signing::{KeyError, SigningError};
use crate::storage::StorageError;
use rpmrepo_schema::SchemaError;
use thiserror::Error;

/// Coarse classification used for logging and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed notification or index document. Aborts the batch.
    Decode,
    /// Object or secret store failure. Aborts the current bucket or artifact.
    Transport,
    /// Missing setting or unusable key material. Fatal before any work.
    Config,
    /// An artifact is not a valid package. Aborts the bucket.
    Parse,
    /// Producing or embedding a signature failed.
    Signing,
    /// The batch deadline expired or a stream side was cancelled.
    Cancelled,
}

/// Any failure raised by an ingestion or signing pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stored metadata document does not decode.
    #[error("malformed document: {0}")]
    Document(#[source] SchemaError),

    /// The notification batch is malformed.
    #[error("malformed notification: {0}")]
    Event(#[from] EventError),

    /// An object store call failed.
    #[error("storage error: {0}")]
    Transport(#[from] StorageError),

    /// The secret store could not supply a value.
    #[error("secret store error: {0}")]
    Secret(#[from] SecretError),

    /// Settings are missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The signing key cannot be loaded.
    #[error("unusable signing key: {0}")]
    Key(#[from] KeyError),

    /// A package object does not decode.
    #[error("invalid package {key}: {source}")]
    Parse {
        /// Key of the offending object.
        key: String,
        /// Decoder failure.
        #[source]
        source: ParseError,
    },

    /// Creating or embedding a signature failed.
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    /// The batch was cancelled; the text names the stage.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Attach the artifact key to a parse failure.
    pub fn parse(key: impl Into<String>, source: ParseError) -> Self {
        Self::Parse {
            key: key.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Document(_) | Self::Event(_) => ErrorKind::Decode,
            Self::Transport(_) | Self::Secret(_) => ErrorKind::Transport,
            Self::Config(_) | Self::Key(_) => ErrorKind::Config,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Configuration errors stop the process before any work is attempted.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Config
    }
}

impl From<SchemaError> for PipelineError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Io(io) => Self::Transport(StorageError::Io(io)),
            other => Self::Document(other),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(StorageError::Io(err))
    }
}

/// Result alias for pipeline operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

//! Core library for rpmrepo.
//!
//! Maintains yum repository metadata in object storage as packages arrive,
//! and signs packages and metadata.
//!
//! - [`ingest`]: per-bucket package ingestion and ordered publication
//! - [`package`]: package header parsing and test fixtures
//! - [`signing`]: embedded package signatures and detached signatures
//! - [`stream`]: the bounded pipe and the streaming document codec
//! - [`storage`]: the object store facade and its backends
//! - [`router`]: batch dispatch

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ingest;
pub mod package;
pub mod router;
pub mod secrets;
pub mod signing;
pub mod storage;
pub mod stream;

pub use config::{ConfigError, SigningConfig, TargetConfig};
pub use context::Context;
pub use error::{ErrorKind, PipelineError, Result};
pub use events::{EventError, ObjectEvent, decode_batch, group_by_bucket};
pub use ingest::{BucketOutcome, StoredRepository, index_bucket, load_repository, publish};
pub use router::{SignOutcome, index_batch, sign_metadata, sign_packages};
pub use storage::{ObjectLocation, ObjectStore, StorageError};

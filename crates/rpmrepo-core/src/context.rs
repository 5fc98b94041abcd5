//! Shared handles for one batch.

use crate::package::{PackageParser, RpmHeaderParser};
use crate::secrets::SecretStore;
use crate::storage::ObjectStore;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a pipeline needs from its environment.
///
/// Cloning is cheap; clones share the same store, secrets and cancellation.
#[derive(Clone)]
pub struct Context {
    /// Where packages and repository metadata live.
    pub store: Arc<dyn ObjectStore>,
    /// Source of the signing key and its passphrase.
    pub secrets: Arc<dyn SecretStore>,
    /// Package header decoder used during ingestion.
    pub parser: Arc<dyn PackageParser>,
    /// Cancelled when the batch deadline expires.
    pub cancel: CancellationToken,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("store", &self.store.backend_name())
            .field("secrets", &self.secrets)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// A context with the default parser and a fresh cancellation token.
    pub fn new(store: Arc<dyn ObjectStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            secrets,
            parser: Arc::new(RpmHeaderParser),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the package parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn PackageParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Share an existing cancellation token, typically the batch deadline.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fail fast once the batch has been cancelled.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Cancelled`](crate::error::PipelineError::Cancelled)
    /// after cancellation.
    pub fn check_cancelled(&self) -> crate::error::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(crate::error::PipelineError::Cancelled(
                "batch deadline expired".to_string(),
            ));
        }
        Ok(())
    }
}

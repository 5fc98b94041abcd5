//! Batch environment: stores, secrets, input and deadline.

use crate::{RuntimeArgs, SecretsKind, StoreKind};
use anyhow::{Context as _, Result, bail};
use rpmrepo_core::secrets::{AwsSecretStore, FileSecretStore, SecretStore};
use rpmrepo_core::storage::{FilesystemStore, ObjectStore, S3Config, S3Store};
use rpmrepo_core::{Context, ObjectEvent, decode_batch};
use std::future::Future;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Build the batch context from command-line settings.
///
/// # Errors
///
/// A backend selected without its required directory.
pub async fn build_context(args: &RuntimeArgs) -> Result<Context> {
    let store: Arc<dyn ObjectStore> = match args.store {
        StoreKind::Fs => {
            let root = args
                .store_root
                .clone()
                .context("--store-root is required with --store fs")?;
            Arc::new(FilesystemStore::new(root))
        }
        StoreKind::S3 => Arc::new(
            S3Store::new(S3Config {
                endpoint: args.s3_endpoint.clone(),
                region: args.s3_region.clone(),
                force_path_style: args.s3_path_style,
                public_read: args.public_read,
            })
            .await,
        ),
    };

    let secrets: Arc<dyn SecretStore> = match args.secrets {
        SecretsKind::File => {
            let dir = args
                .secrets_dir
                .clone()
                .context("--secrets-dir is required with --secrets file")?;
            Arc::new(FileSecretStore::new(dir))
        }
        SecretsKind::Aws => Arc::new(AwsSecretStore::new(args.s3_region.clone()).await),
    };

    tracing::debug!(store = store.backend_name(), "batch context ready");
    Ok(Context::new(store, secrets))
}

/// Read and decode the notification batch.
///
/// # Errors
///
/// Unreadable input or a malformed batch.
pub fn read_events(source: &str) -> Result<Vec<ObjectEvent>> {
    let mut input = Vec::new();
    if source == "-" {
        std::io::stdin()
            .read_to_end(&mut input)
            .context("Failed to read notification batch from stdin")?;
    } else {
        input = std::fs::read(source)
            .with_context(|| format!("Failed to read notification batch from {source}"))?;
    }
    Ok(decode_batch(&input)?)
}

/// Run `work` under the batch deadline. On expiry the context is cancelled,
/// which stops every in-flight stream.
///
/// # Errors
///
/// The failure of `work`, or expiry of the deadline.
pub async fn with_deadline<T, F>(ctx: &Context, timeout: u64, work: F) -> Result<T>
where
    F: Future<Output = rpmrepo_core::Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout), work).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            ctx.cancel.cancel();
            bail!("batch deadline of {timeout}s expired")
        }
    }
}

//! Batch dispatch.
//!
//! Ingestion fans out one pass per bucket, concurrently. Signing walks the
//! batch in order. In both cases a failure is logged and the remaining work
//! still runs; the first error is returned once everything has stopped so the
//! batch is retried as a whole.

use crate::config::{SigningConfig, TargetConfig};
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::events::{ObjectEvent, group_by_bucket};
use crate::ingest::{BucketOutcome, index_bucket};
use crate::signing::{SIGNATURE_SUFFIX, load_keyring, sign_detached, sign_package};
use crate::storage::ObjectLocation;
use futures::future::join_all;
use rpmrepo_schema::PACKAGE_SUFFIX;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one signing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    /// Written to this location.
    Signed(ObjectLocation),
    /// Source was gone.
    Skipped(ObjectLocation),
}

fn first_error<T>(results: Vec<(String, Result<T>)>) -> (Vec<(String, T)>, Option<PipelineError>) {
    let mut ok = Vec::with_capacity(results.len());
    let mut first = None;
    for (label, result) in results {
        match result {
            Ok(value) => ok.push((label, value)),
            Err(err) => {
                tracing::error!(target_object = %label, kind = ?err.kind(), error = %err, "operation failed");
                first.get_or_insert(err);
            }
        }
    }
    (ok, first)
}

/// Index every bucket in the batch.
///
/// # Errors
///
/// The first bucket failure, after all buckets have finished.
pub async fn index_batch(
    ctx: &Context,
    events: Vec<ObjectEvent>,
) -> Result<BTreeMap<String, BucketOutcome>> {
    let groups = group_by_bucket(events);
    tracing::info!(buckets = groups.len(), "indexing batch");

    let results = join_all(groups.iter().map(|(bucket, events)| async move {
        (bucket.clone(), index_bucket(ctx, bucket, events).await)
    }))
    .await;

    match first_error(results) {
        (_, Some(err)) => Err(err),
        (outcomes, None) => Ok(outcomes.into_iter().collect()),
    }
}

/// Sign every package in the batch.
///
/// # Errors
///
/// Key loading failures before any work; otherwise the first package
/// failure, after every package has been attempted.
pub async fn sign_packages(
    ctx: &Context,
    signing: &SigningConfig,
    target: &TargetConfig,
    events: Vec<ObjectEvent>,
) -> Result<Vec<SignOutcome>> {
    let keyring = Arc::new(load_keyring(ctx.secrets.as_ref(), signing).await?);

    let mut results = Vec::new();
    for event in events {
        let source = ObjectLocation::new(event.bucket, event.key);
        if !source.key.ends_with(PACKAGE_SUFFIX) {
            tracing::debug!(source = %source, "not a package, ignoring");
            continue;
        }
        let result = sign_package(ctx, Arc::clone(&keyring), target, &source)
            .await
            .map(|dest| match dest {
                Some(dest) => SignOutcome::Signed(dest),
                None => SignOutcome::Skipped(source.clone()),
            });
        results.push((source.to_string(), result));
    }

    match first_error(results) {
        (_, Some(err)) => Err(err),
        (outcomes, None) => Ok(outcomes.into_iter().map(|(_, o)| o).collect()),
    }
}

/// Write detached signatures for every object in the batch.
///
/// Signature objects themselves are ignored so that their own creation
/// events do not trigger another round.
///
/// # Errors
///
/// As for [`sign_packages`].
pub async fn sign_metadata(
    ctx: &Context,
    signing: &SigningConfig,
    events: Vec<ObjectEvent>,
) -> Result<Vec<SignOutcome>> {
    let keyring = load_keyring(ctx.secrets.as_ref(), signing).await?;

    let mut results = Vec::new();
    for event in events {
        let source = ObjectLocation::new(event.bucket, event.key);
        if source.key.ends_with(SIGNATURE_SUFFIX) {
            tracing::debug!(source = %source, "already a signature, ignoring");
            continue;
        }
        let result = sign_detached(ctx, &keyring, &source)
            .await
            .map(|dest| match dest {
                Some(dest) => SignOutcome::Signed(dest),
                None => SignOutcome::Skipped(source.clone()),
            });
        results.push((source.to_string(), result));
    }

    match first_error(results) {
        (_, Some(err)) => Err(err),
        (outcomes, None) => Ok(outcomes.into_iter().map(|(_, o)| o).collect()),
    }
}

//! Per-bucket package ingestion and index publication.
//!
//! Publication order is fixed so that readers only ever see a consistent
//! repository: both lists are uploaded and recorded before the
//! index-of-indexes, which is written last. A failure before that point
//! leaves the previous `repomd.xml` in place.

use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::events::ObjectEvent;
use crate::package::scan_package;
use crate::storage::ObjectStore;
use crate::stream::{LoadedDocument, StoredDocument, load_document, read_document, upload_document};
use rpmrepo_schema::{
    Checksum, DataKind, FILELISTS_KEY, FileListData, PACKAGE_SUFFIX, PRIMARY_KEY, PackageList, REPOMD_KEY,
    RepoMd, Repository, ScannedPackage,
};
use std::sync::Arc;
use tokio_util::io::SyncIoBridge;
use tracing::instrument;

/// What an ingestion pass did to a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOutcome {
    /// No package events; the repository was not touched.
    NoPackages,
    /// Every package was already indexed.
    Unchanged {
        /// Packages scanned from the batch.
        packages: usize,
    },
    /// New metadata was published.
    Published {
        /// Packages scanned from the batch.
        packages: usize,
        /// The index-of-indexes that was written.
        repomd: StoredDocument,
    },
}

/// The stored repository and whether its lists agree with `repomd.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRepository {
    /// Decoded documents. Missing ones start empty.
    pub repository: Repository,
    /// `false` when a stored list does not match its index record, as left
    /// behind by a publish that stopped before `repomd.xml` was written.
    pub consistent: bool,
}

fn matches_record(repomd: &RepoMd, kind: DataKind, stored: Option<&Checksum>) -> bool {
    match (repomd.get(kind), stored) {
        (None, None) => true,
        (Some(record), Some(checksum)) => record.checksum == *checksum,
        _ => false,
    }
}

/// Read the current repository state, hashing both lists as they stream in.
///
/// # Errors
///
/// Transport failures and malformed documents.
pub async fn load_repository(store: &dyn ObjectStore, bucket: &str) -> Result<StoredRepository> {
    let repomd: Option<RepoMd> = read_document(store, bucket, REPOMD_KEY).await?;
    let primary: Option<LoadedDocument<PackageList>> =
        load_document(store, bucket, PRIMARY_KEY).await?;
    let filelists: Option<LoadedDocument<FileListData>> =
        load_document(store, bucket, FILELISTS_KEY).await?;
    if repomd.is_none() {
        tracing::info!(bucket, "no published repository, starting empty");
    }
    let repomd = repomd.unwrap_or_default();

    let consistent = matches_record(
        &repomd,
        DataKind::Primary,
        primary.as_ref().map(|d| &d.object_checksum),
    ) && matches_record(
        &repomd,
        DataKind::Filelists,
        filelists.as_ref().map(|d| &d.object_checksum),
    );
    if !consistent {
        tracing::warn!(bucket, "stored lists do not match repomd.xml");
    }

    Ok(StoredRepository {
        repository: Repository::new(
            repomd,
            primary.map(|d| d.document).unwrap_or_default(),
            filelists.map(|d| d.document).unwrap_or_default(),
        ),
        consistent,
    })
}

/// Fetch and scan one package. `None` when it no longer exists.
async fn scan_object(ctx: &Context, bucket: &str, key: &str) -> Result<Option<ScannedPackage>> {
    ctx.check_cancelled()?;
    let Some(reader) = ctx.store.get(bucket, key).await? else {
        tracing::warn!(bucket, key, "package vanished before indexing, skipping");
        return Ok(None);
    };

    let parser = Arc::clone(&ctx.parser);
    let owned_key = key.to_string();
    let bridge = SyncIoBridge::new(reader);
    let scanned = tokio::task::spawn_blocking(move || scan_package(parser.as_ref(), &owned_key, bridge))
        .await
        .map_err(|e| PipelineError::Cancelled(format!("scan task failed: {e}")))?
        .map_err(|e| PipelineError::parse(key, e))?;

    tracing::debug!(
        bucket,
        key,
        package = %scanned.name,
        version = %scanned.version,
        checksum = %scanned.checksum,
        "scanned package"
    );
    Ok(Some(scanned))
}

async fn publish_document<D>(ctx: &Context, bucket: &str, key: &str, doc: D) -> Result<StoredDocument>
where
    D: rpmrepo_schema::XmlDocument + 'static,
{
    upload_document(ctx.store.as_ref(), bucket, key, Arc::new(doc), &ctx.cancel).await
}

/// Upload both lists, then the index-of-indexes.
///
/// # Errors
///
/// The first failing upload. Nothing after it is attempted.
pub async fn publish(ctx: &Context, bucket: &str, mut repo: Repository) -> Result<StoredDocument> {
    let primary = publish_document(ctx, bucket, PRIMARY_KEY, std::mem::take(&mut repo.primary)).await?;
    repo.refresh_index_record(
        DataKind::Primary,
        primary.key,
        primary.object_checksum,
        primary.content_checksum,
        chrono::Utc::now().timestamp(),
    );

    let filelists =
        publish_document(ctx, bucket, FILELISTS_KEY, std::mem::take(&mut repo.filelists)).await?;
    repo.refresh_index_record(
        DataKind::Filelists,
        filelists.key,
        filelists.object_checksum,
        filelists.content_checksum,
        chrono::Utc::now().timestamp(),
    );

    publish_document(ctx, bucket, REPOMD_KEY, repo.repomd).await
}

/// Index the package events of one bucket.
///
/// # Errors
///
/// Any transport, parse or decode failure aborts the bucket.
#[instrument(skip(ctx, events), fields(events = events.len()))]
pub async fn index_bucket(ctx: &Context, bucket: &str, events: &[ObjectEvent]) -> Result<BucketOutcome> {
    let mut scanned = Vec::new();
    for event in events.iter().filter(|e| e.key.ends_with(PACKAGE_SUFFIX)) {
        if let Some(package) = scan_object(ctx, bucket, &event.key).await? {
            scanned.push(package);
        }
    }
    if scanned.is_empty() {
        tracing::info!(bucket, "no packages to index");
        return Ok(BucketOutcome::NoPackages);
    }

    let StoredRepository {
        repository: mut repo,
        consistent,
    } = load_repository(ctx.store.as_ref(), bucket).await?;
    // An interrupted publish is repaired even when nothing new arrived.
    if !repo.update(&scanned) && consistent {
        tracing::info!(bucket, packages = scanned.len(), "repository already up to date");
        return Ok(BucketOutcome::Unchanged {
            packages: scanned.len(),
        });
    }

    let repomd = publish(ctx, bucket, repo).await?;
    tracing::info!(
        bucket,
        packages = scanned.len(),
        repomd = %repomd.object_checksum,
        "published repository metadata"
    );
    Ok(BucketOutcome::Published {
        packages: scanned.len(),
        repomd,
    })
}

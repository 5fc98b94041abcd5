//! S3-compatible storage backend using the AWS SDK.
//!
//! Uploads are streamed in [`PART_SIZE`] chunks. A body that fits in one part
//! goes out as a single `PutObject`; anything larger becomes a multipart
//! upload that is aborted if any part fails or the upload is dropped.

use super::{ObjectReader, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use bytes::Bytes;
use s3::error::SdkError;
use s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// Upload part size (5 MiB, the S3 minimum for all but the last part).
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Custom endpoint (MinIO, R2, localstack). `None` uses AWS.
    pub endpoint: Option<String>,
    /// Region override. `None` uses the ambient AWS configuration.
    pub region: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: bool,
    /// Apply the `public-read` canned ACL to every upload.
    pub public_read: bool,
}

/// Object store backed by S3.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: s3::Client,
    public_read: bool,
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(service) if service.raw().status().as_u16() == 404)
}

impl S3Store {
    /// Build a client from the ambient AWS configuration plus `config`.
    pub async fn new(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: s3::Client::from_conf(builder.build()),
            public_read: config.public_read,
        }
    }

    /// Wrap an existing client.
    pub fn from_client(client: s3::Client, public_read: bool) -> Self {
        Self {
            client,
            public_read,
        }
    }

    fn acl(&self) -> Option<ObjectCannedAcl> {
        self.public_read.then_some(ObjectCannedAcl::PublicRead)
    }
}

/// The multipart calls behind a large `put`.
#[async_trait]
trait Multipart: Send + Sync + 'static {
    /// Start an upload and return its id.
    async fn create(&self, bucket: &str, key: &str, content_type: &str) -> StorageResult<String>;

    /// Upload one part and return its entity tag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<String>;

    async fn complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<()>;

    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()>;
}

#[derive(Debug, Clone)]
struct S3Multipart {
    client: s3::Client,
    acl: Option<ObjectCannedAcl>,
}

#[async_trait]
impl Multipart for S3Multipart {
    async fn create(&self, bucket: &str, key: &str, content_type: &str) -> StorageResult<String> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_acl(self.acl.clone())
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", "create multipart upload", bucket, key, e))?;
        created
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Config("S3 did not return an upload id".to_string()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<String> {
        let uploaded = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(body.into())
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", "upload part", bucket, key, e))?;
        Ok(uploaded.e_tag().unwrap_or_default().to_string())
    }

    async fn complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<()> {
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", "complete multipart upload", bucket, key, e))?;
        Ok(())
    }

    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", "abort multipart upload", bucket, key, e))?;
        Ok(())
    }
}

async fn abort_upload<M: Multipart>(uploads: &M, bucket: &str, key: &str, upload_id: &str) {
    match uploads.abort(bucket, key, upload_id).await {
        Ok(()) => tracing::debug!(bucket, key, upload_id, "aborted multipart upload"),
        Err(err) => tracing::warn!(
            bucket,
            key,
            upload_id,
            error = %err,
            "failed to abort multipart upload, orphaned parts may remain"
        ),
    }
}

/// Aborts the upload unless disarmed. Dropping it while armed, as happens
/// when the `put` future is cancelled, spawns the abort on the runtime.
struct AbortGuard<M: Multipart> {
    uploads: Arc<M>,
    bucket: String,
    key: String,
    upload_id: String,
    armed: bool,
}

impl<M: Multipart> AbortGuard<M> {
    fn new(uploads: Arc<M>, bucket: &str, key: &str, upload_id: String) -> Self {
        Self {
            uploads,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    async fn abort(mut self) {
        self.armed = false;
        abort_upload(self.uploads.as_ref(), &self.bucket, &self.key, &self.upload_id).await;
    }
}

impl<M: Multipart> Drop for AbortGuard<M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id = %self.upload_id,
                "no runtime to abort multipart upload, orphaned parts may remain"
            );
            return;
        };
        let uploads = Arc::clone(&self.uploads);
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        tracing::info!(
            bucket = %bucket,
            key = %key,
            upload_id = %upload_id,
            "multipart upload interrupted, aborting"
        );
        runtime.spawn(async move {
            abort_upload(uploads.as_ref(), &bucket, &key, &upload_id).await;
        });
    }
}

/// Upload `first` and the rest of `body` as a multipart upload.
///
/// The upload is aborted when a part or the completion fails, and when the
/// returned future is dropped before it finishes.
async fn put_multipart<M: Multipart>(
    uploads: Arc<M>,
    bucket: &str,
    key: &str,
    first: Vec<u8>,
    body: &mut ObjectReader,
    content_type: &str,
) -> StorageResult<u64> {
    let upload_id = uploads.create(bucket, key, content_type).await?;
    let guard = AbortGuard::new(Arc::clone(&uploads), bucket, key, upload_id.clone());

    let (parts, written) =
        match upload_parts(uploads.as_ref(), bucket, key, &upload_id, first, body).await {
            Ok(uploaded) => uploaded,
            Err(err) => {
                guard.abort().await;
                return Err(err);
            }
        };
    if let Err(err) = uploads.complete(bucket, key, &upload_id, parts).await {
        guard.abort().await;
        return Err(err);
    }
    guard.disarm();
    Ok(written)
}

async fn upload_parts<M: Multipart>(
    uploads: &M,
    bucket: &str,
    key: &str,
    upload_id: &str,
    first: Vec<u8>,
    body: &mut ObjectReader,
) -> StorageResult<(Vec<CompletedPart>, u64)> {
    let mut parts = Vec::new();
    let mut written = 0u64;
    let mut chunk = first;
    let mut part_number = 1i32;

    while !chunk.is_empty() {
        let len = chunk.len() as u64;
        let e_tag = uploads
            .upload_part(bucket, key, upload_id, part_number, Bytes::from(chunk))
            .await?;
        parts.push(
            CompletedPart::builder()
                .e_tag(e_tag)
                .part_number(part_number)
                .build(),
        );
        written += len;
        part_number += 1;
        chunk = read_part(body).await?;
    }

    Ok((parts, written))
}

/// Fill one part from the body. Shorter than [`PART_SIZE`] only at EOF.
async fn read_part(body: &mut ObjectReader) -> StorageResult<Vec<u8>> {
    let mut part = Vec::with_capacity(PART_SIZE);
    let mut limited = body.take(PART_SIZE as u64);
    limited.read_to_end(&mut part).await?;
    Ok(part)
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectReader>> {
        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(Box::pin(output.body.into_async_read()))),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(StorageError::backend("s3", "get", bucket, key, err)),
        }
    }

    #[instrument(skip(self, body), fields(backend = "s3"))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectReader,
        content_type: &str,
    ) -> StorageResult<u64> {
        let first = read_part(&mut body).await?;
        if first.len() < PART_SIZE {
            let len = first.len() as u64;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type(content_type)
                .set_acl(self.acl())
                .body(Bytes::from(first).into())
                .send()
                .await
                .map_err(|e| StorageError::backend("s3", "put", bucket, key, e))?;
            return Ok(len);
        }

        let uploads = Arc::new(S3Multipart {
            client: self.client.clone(),
            acl: self.acl(),
        });
        put_multipart(uploads, bucket, key, first, &mut body, content_type).await
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", "delete", bucket, key, e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

//! Streaming document codec.
//!
//! Uploads serialize, compress and hash in a single pass:
//!
//! ```text
//! encode ─▶ tee ─┬─▶ content checksum
//!                └─▶ gzip ─▶ tee ─┬─▶ object checksum
//!                                 └─▶ pipe ─▶ ObjectStore::put
//! ```
//!
//! Reads go the other way: the object is streamed through a gzip decoder and
//! decoded. A missing object is reported as `None`.

use super::pipe::{PipeWriter, run_piped};
use crate::error::PipelineError;
use crate::storage::{CONTENT_TYPE_GZIP, CONTENT_TYPE_XML, ObjectStore};
use async_compression::tokio::bufread::GzipDecoder;
use flate2::write::GzEncoder;
use rpmrepo_schema::{Checksum, ChecksumWriter, SchemaError, TeeWriter, XmlDocument};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Storage encoding of a document, derived from its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Stored as-is.
    Plain,
    /// Stored gzip-compressed.
    Gzip,
}

impl Encoding {
    /// `.gz` keys are compressed; everything else is plain.
    pub fn for_key(key: &str) -> Self {
        if key.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Plain
        }
    }

    /// Content type used on upload.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Plain => CONTENT_TYPE_XML,
            Self::Gzip => CONTENT_TYPE_GZIP,
        }
    }
}

/// Result of a completed document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Key the document was written to.
    pub key: String,
    /// Checksum of the stored bytes.
    pub object_checksum: Checksum,
    /// Checksum of the uncompressed document.
    pub content_checksum: Checksum,
    /// Stored size in bytes.
    pub size: u64,
}

/// Serialize `doc` into `sink`, returning `(object, content)` checksums.
fn encode_into<D: XmlDocument>(
    doc: &D,
    encoding: Encoding,
    sink: &mut PipeWriter,
) -> Result<(Checksum, Checksum), PipelineError> {
    let mut content = ChecksumWriter::new();
    let mut object = ChecksumWriter::new();

    match encoding {
        Encoding::Gzip => {
            let mut gz = GzEncoder::new(
                TeeWriter::new(&mut object, sink),
                flate2::Compression::default(),
            );
            doc.encode(TeeWriter::new(&mut content, &mut gz))?;
            gz.finish().map_err(SchemaError::Io)?;
        }
        Encoding::Plain => {
            // Stored bytes are the document bytes.
            doc.encode(TeeWriter::new(&mut content, TeeWriter::new(&mut object, sink)))?;
        }
    }

    Ok((object.sum(), content.sum()))
}

/// Upload `doc` to `bucket/key`, compressing when the key ends in `.gz`.
///
/// # Errors
///
/// Returns the first failure of either the encoder or the upload. Nothing is
/// returned until both sides have stopped.
#[instrument(skip(store, doc, cancel), fields(document = D::ROOT))]
pub async fn upload_document<D>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    doc: Arc<D>,
    cancel: &CancellationToken,
) -> Result<StoredDocument, PipelineError>
where
    D: XmlDocument + 'static,
{
    let encoding = Encoding::for_key(key);
    let ((object_checksum, content_checksum), size) = run_piped(
        cancel,
        move |sink: &mut PipeWriter| encode_into(doc.as_ref(), encoding, sink),
        |reader| async move {
            store
                .put(bucket, key, Box::pin(reader), encoding.content_type())
                .await
                .map_err(PipelineError::from)
        },
    )
    .await?;

    tracing::debug!(
        bucket,
        key,
        size,
        object = %object_checksum,
        content = %content_checksum,
        "uploaded document"
    );

    Ok(StoredDocument {
        key: key.to_string(),
        object_checksum,
        content_checksum,
        size,
    })
}

/// A decoded document together with the checksum of its stored bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument<D> {
    /// Decoded document.
    pub document: D,
    /// Checksum of the bytes as stored, before decompression.
    pub object_checksum: Checksum,
}

/// Hashes every byte pulled from the inner reader.
struct HashingAsyncReader<R> {
    inner: R,
    sum: ChecksumWriter,
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingAsyncReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.sum.update(&buf.filled()[before..]);
        Poll::Ready(Ok(()))
    }
}

/// Fetch and decode a document. `Ok(None)` when the object does not exist.
///
/// # Errors
///
/// Transport failures and malformed content are both errors.
pub async fn read_document<D: XmlDocument>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<Option<D>, PipelineError> {
    Ok(load_document(store, bucket, key)
        .await?
        .map(|loaded| loaded.document))
}

/// Like [`read_document`], also hashing the stored bytes on the way through.
///
/// The whole object is consumed, including anything after the end of the
/// gzip stream, so the checksum matches what an upload recorded.
///
/// # Errors
///
/// Transport failures and malformed content are both errors.
#[instrument(skip(store), fields(document = D::ROOT))]
pub async fn load_document<D: XmlDocument>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<Option<LoadedDocument<D>>, PipelineError> {
    let Some(reader) = store.get(bucket, key).await? else {
        tracing::debug!(bucket, key, "document not found");
        return Ok(None);
    };

    let mut hashing = HashingAsyncReader {
        inner: reader,
        sum: ChecksumWriter::new(),
    };
    let mut text = String::new();
    let read = match Encoding::for_key(key) {
        Encoding::Gzip => {
            GzipDecoder::new(BufReader::new(&mut hashing))
                .read_to_string(&mut text)
                .await
        }
        Encoding::Plain => hashing.read_to_string(&mut text).await,
    };
    let read = match read {
        Ok(_) => tokio::io::copy(&mut hashing, &mut tokio::io::sink()).await,
        Err(err) => Err(err),
    };

    if let Err(err) = read {
        // Corrupt gzip streams and invalid UTF-8 are content problems.
        return Err(if err.kind() == io::ErrorKind::InvalidData {
            PipelineError::Document(SchemaError::Decode {
                root: D::ROOT,
                message: err.to_string(),
            })
        } else {
            err.into()
        });
    }

    Ok(Some(LoadedDocument {
        document: D::decode(&text)?,
        object_checksum: hashing.sum.sum(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use flate2::read::GzDecoder;
    use rpmrepo_schema::{PRIMARY_KEY, PackageList, REPOMD_KEY, RepoMd, Repository, ScannedPackage, Size, Version};
    use std::io::Read;

    fn sample_list() -> PackageList {
        let mut repo = Repository::default();
        repo.update(&[ScannedPackage {
            key: "foo-1.0-1.x86_64.rpm".to_string(),
            name: "foo".to_string(),
            arch: "x86_64".to_string(),
            version: Version::new("0", "1.0", "1"),
            checksum: Checksum::sha256("abc123"),
            size: Size::default(),
            files: vec!["/usr/bin/foo".to_string()],
        }]);
        repo.primary
    }

    #[tokio::test]
    async fn gzip_upload_pairs_checksums() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let stored = upload_document(&store, "repo", PRIMARY_KEY, Arc::new(sample_list()), &cancel)
            .await
            .unwrap();

        let object = store.object("repo", PRIMARY_KEY).unwrap();
        assert_eq!(object.content_type, CONTENT_TYPE_GZIP);
        assert_eq!(stored.object_checksum, Checksum::compute(&object.data));
        assert_eq!(stored.size, object.data.len() as u64);

        let mut plain = Vec::new();
        GzDecoder::new(&object.data[..]).read_to_end(&mut plain).unwrap();
        assert_eq!(stored.content_checksum, Checksum::compute(&plain));
        assert_ne!(stored.object_checksum, stored.content_checksum);
    }

    #[tokio::test]
    async fn plain_upload_has_equal_checksums() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let stored = upload_document(&store, "repo", REPOMD_KEY, Arc::new(RepoMd::new()), &cancel)
            .await
            .unwrap();

        let object = store.object("repo", REPOMD_KEY).unwrap();
        assert_eq!(object.content_type, CONTENT_TYPE_XML);
        assert_eq!(stored.object_checksum, stored.content_checksum);
        assert_eq!(stored.content_checksum, Checksum::compute(&object.data));
    }

    #[tokio::test]
    async fn round_trips_through_store() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let list = sample_list();
        upload_document(&store, "repo", PRIMARY_KEY, Arc::new(list.clone()), &cancel)
            .await
            .unwrap();

        let read: PackageList = read_document(&store, "repo", PRIMARY_KEY).await.unwrap().unwrap();
        assert_eq!(read, list);
    }

    #[tokio::test]
    async fn load_hashes_stored_bytes() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let stored = upload_document(&store, "repo", PRIMARY_KEY, Arc::new(sample_list()), &cancel)
            .await
            .unwrap();

        let loaded: LoadedDocument<PackageList> =
            load_document(&store, "repo", PRIMARY_KEY).await.unwrap().unwrap();
        assert_eq!(loaded.object_checksum, stored.object_checksum);
        assert_eq!(loaded.document, sample_list());
    }

    #[tokio::test]
    async fn load_hashes_trailing_bytes() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        upload_document(&store, "repo", PRIMARY_KEY, Arc::new(sample_list()), &cancel)
            .await
            .unwrap();
        let mut data = store.object("repo", PRIMARY_KEY).unwrap().data.to_vec();
        data.extend_from_slice(b"trailer");
        store.insert("repo", PRIMARY_KEY, data.clone(), CONTENT_TYPE_GZIP);

        let loaded: LoadedDocument<PackageList> =
            load_document(&store, "repo", PRIMARY_KEY).await.unwrap().unwrap();
        assert_eq!(loaded.object_checksum, Checksum::compute(&data));
    }

    #[tokio::test]
    async fn missing_document_is_none() {
        let store = MemoryStore::new();
        let read: Option<RepoMd> = read_document(&store, "repo", REPOMD_KEY).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn corrupt_gzip_is_a_decode_error() {
        let store = MemoryStore::new();
        store.insert("repo", PRIMARY_KEY, &b"not gzip at all"[..], CONTENT_TYPE_GZIP);
        let err = read_document::<PackageList>(&store, "repo", PRIMARY_KEY)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Decode);
    }

    #[tokio::test]
    async fn failed_upload_surfaces_store_error() {
        let store = MemoryStore::new();
        store.fail_put("repo", PRIMARY_KEY);
        let cancel = CancellationToken::new();
        let err = upload_document(&store, "repo", PRIMARY_KEY, Arc::new(sample_list()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)), "{err}");
        assert!(err.to_string().contains("injected failure"));
    }
}

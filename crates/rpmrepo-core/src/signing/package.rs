//! Embedded package signatures.
//!
//! The OpenPGP signature covers the main header, which in turn records the
//! payload digests, and is stored in the signature header as `rpmsign`
//! does. Re-signing replaces previous signatures, so signing a package twice
//! yields one signature.

use super::SigningError;
use super::key::{Keyring, PublicKeys};
use super::target::destination;
use crate::config::TargetConfig;
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::package::read_metadata;
use crate::storage::{CONTENT_TYPE_RPM, ObjectLocation};
use crate::stream::{PipeWriter, run_piped};
use rpm::{Package, SignatureHeaderBuilder};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Rewrite the package in `input` into `output` with a fresh signature.
/// Returns the number of bytes written.
///
/// Only the lead and signature header are re-encoded; the main header and
/// payload are copied byte for byte.
///
/// # Errors
///
/// Fails if the input is not a package or either side of the copy fails.
pub fn embed_signature<R, W>(
    input: &mut R,
    output: &mut W,
    keyring: &Keyring,
) -> Result<u64, SigningError>
where
    R: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    input.seek(SeekFrom::Start(0))?;
    let mut metadata = read_metadata(&mut BufReader::new(&mut *input))?;
    let payload_offset = metadata.get_package_segment_offsets().payload;

    let header_bytes = metadata.header_bytes()?;
    let signature = keyring.sign(&header_bytes[..])?;
    metadata.signature = SignatureHeaderBuilder::from_existing(&metadata.signature)?
        .clear_signatures()
        .add_openpgp_signature(signature)
        .build()?;

    let mut head = Vec::with_capacity(header_bytes.len() + 8192);
    metadata.write(&mut head)?;
    output.write_all(&head)?;
    input.seek(SeekFrom::Start(payload_offset))?;
    let body = io::copy(input, output)?;
    output.flush()?;

    Ok(head.len() as u64 + body)
}

/// Check the embedded signature and the header and payload digests.
///
/// # Errors
///
/// [`SigningError::Unsigned`] when no signature is present,
/// [`SigningError::Crypto`] when it does not verify against `keys` or the
/// package was altered after signing.
pub fn verify_package<R: Read + ?Sized>(
    input: &mut R,
    keys: &PublicKeys,
) -> Result<(), SigningError> {
    let mut reader = BufReader::new(input);
    let metadata = read_metadata(&mut reader)?;
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    Package { metadata, payload }.verify_signature(keys.verifier())?;
    Ok(())
}

fn signing_failure(key: &str, err: SigningError) -> PipelineError {
    match err {
        SigningError::Parse(source) => PipelineError::parse(key, source),
        other => other.into(),
    }
}

/// Sign the package at `source` and write it to its destination.
///
/// The source is staged to a temporary file, re-signed while streaming to the
/// destination, and deleted afterwards when the destination differs. Returns
/// `None` when the source no longer exists.
///
/// # Errors
///
/// Transport, parse and signing failures abort this package only.
#[instrument(skip_all, fields(source = %source))]
pub async fn sign_package(
    ctx: &Context,
    keyring: Arc<Keyring>,
    target: &TargetConfig,
    source: &ObjectLocation,
) -> Result<Option<ObjectLocation>> {
    let Some(mut reader) = ctx.store.get(&source.bucket, &source.key).await? else {
        tracing::warn!(source = %source, "package vanished before signing, skipping");
        return Ok(None);
    };

    let mut staged = tokio::fs::File::from_std(tempfile::tempfile()?);
    tokio::select! {
        () = ctx.cancel.cancelled() => {
            return Err(PipelineError::Cancelled("staging cancelled".to_string()));
        }
        copied = tokio::io::copy(&mut reader, &mut staged) => {
            let copied = copied?;
            tracing::debug!(bytes = copied, "staged package");
        }
    }
    staged.flush().await?;
    let mut staged = staged.into_std().await;

    let dest = destination(target, source);
    let source_key = source.key.clone();
    let (_, written) = run_piped(
        &ctx.cancel,
        move |sink: &mut PipeWriter| {
            embed_signature(&mut staged, sink, &keyring)
                .map_err(|e| signing_failure(&source_key, e))
        },
        |body| async {
            ctx.store
                .put(&dest.bucket, &dest.key, Box::pin(body), CONTENT_TYPE_RPM)
                .await
                .map_err(PipelineError::from)
        },
    )
    .await?;

    if dest != *source {
        ctx.store.delete(&source.bucket, &source.key).await?;
    }
    tracing::info!(destination = %dest, bytes = written, "signed package");
    Ok(Some(dest))
}

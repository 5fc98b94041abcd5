//! Detached signatures for repository metadata.
//!
//! The signature of `key` is stored next to it as `key.asc`: an armored
//! OpenPGP binary signature, the form `gpg --verify` and dnf's
//! `repo_gpgcheck` expect.

use super::SigningError;
use super::key::{Keyring, PublicKeys};
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::storage::{CONTENT_TYPE_SIGNATURE, ObjectLocation};
use pgp::composed::{ArmorOptions, Deserializable, DetachedSignature};
use pgp::ser::Serialize;
use std::io::{self, Read};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Suffix of detached signature objects.
pub const SIGNATURE_SUFFIX: &str = ".asc";

/// Key of the detached signature for `key`.
pub fn signature_key(key: &str) -> String {
    format!("{key}{SIGNATURE_SUFFIX}")
}

fn malformed(err: impl std::fmt::Display) -> SigningError {
    SigningError::Malformed(err.to_string())
}

/// Armor a binary signature packet.
///
/// # Errors
///
/// [`SigningError::Malformed`] if `signature` is not a signature packet.
pub fn armor(signature: &[u8]) -> Result<String, SigningError> {
    DetachedSignature::from_bytes(signature)
        .and_then(|parsed| parsed.to_armored_string(ArmorOptions::default()))
        .map_err(malformed)
}

/// Extract the binary signature packet from armored text.
///
/// # Errors
///
/// [`SigningError::Malformed`] for missing markers, bad base64 or a block
/// that holds no signature.
pub fn dearmor(text: &str) -> Result<Vec<u8>, SigningError> {
    let (signature, _) = DetachedSignature::from_armor_single(text.as_bytes()).map_err(malformed)?;
    signature.to_bytes().map_err(malformed)
}

/// Check an armored detached signature over everything in `input`.
///
/// # Errors
///
/// Fails for malformed armor or a signature that does not verify.
pub fn verify_detached<R: Read + ?Sized>(
    input: &mut R,
    armored: &str,
    keys: &PublicKeys,
) -> Result<(), SigningError> {
    let signature = dearmor(armored)?;
    keys.verify(input, &signature)
}

/// Fails reads once the token is cancelled.
struct Cancellable<R> {
    inner: R,
    cancel: CancellationToken,
}

impl<R: Read> Read for Cancellable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("signing cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Sign everything `reader` yields and armor the result. Blocking.
///
/// # Errors
///
/// Read failures and signature creation failures.
pub fn sign_reader<R: Read>(keyring: &Keyring, reader: R) -> Result<String, SigningError> {
    armor(&keyring.sign(reader)?)
}

/// Sign the object at `source` and upload the armored signature beside it.
///
/// The object is streamed through the signer once and never modified.
/// Returns the signature location, or `None` when the object no longer
/// exists.
///
/// # Errors
///
/// Transport and signing failures abort this object only.
#[instrument(skip_all, fields(source = %source))]
pub async fn sign_detached(
    ctx: &Context,
    keyring: &Keyring,
    source: &ObjectLocation,
) -> Result<Option<ObjectLocation>> {
    let Some(reader) = ctx.store.get(&source.bucket, &source.key).await? else {
        tracing::warn!(source = %source, "object vanished before signing, skipping");
        return Ok(None);
    };

    let input = Cancellable {
        inner: SyncIoBridge::new(reader),
        cancel: ctx.cancel.clone(),
    };
    let keyring = keyring.clone();
    let signed = tokio::task::spawn_blocking(move || sign_reader(&keyring, input))
        .await
        .map_err(io::Error::other)?;
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled("detached signing cancelled".to_string()));
    }
    let armored = signed?;

    let dest = ObjectLocation::new(source.bucket.clone(), signature_key(&source.key));
    ctx.store
        .put(
            &dest.bucket,
            &dest.key,
            Box::pin(io::Cursor::new(armored.into_bytes())),
            CONTENT_TYPE_SIGNATURE,
        )
        .await?;

    tracing::info!(signature = %dest, "wrote detached signature");
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;
    use crate::signing::key::fixtures;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn armor_round_trip() {
        let sig = fixtures::keyring().sign(&b"repomd"[..]).unwrap();
        let text = armor(&sig).unwrap();

        assert!(text.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert!(text.trim_end().ends_with("-----END PGP SIGNATURE-----"));
        assert_eq!(dearmor(&text).unwrap(), sig);
    }

    #[test]
    fn dearmor_rejects_garbage() {
        assert!(matches!(dearmor("hello"), Err(SigningError::Malformed(_))));
        let truncated = "-----BEGIN PGP SIGNATURE-----\n\nAAAA\n-----END PGP SIGNATURE-----\n";
        assert!(matches!(dearmor(truncated), Err(SigningError::Malformed(_))));
        assert!(matches!(armor(b"not a packet"), Err(SigningError::Malformed(_))));
    }

    #[test]
    fn signature_does_not_cover_other_content() {
        let armored = sign_reader(&fixtures::keyring(), &b"<repomd/>"[..]).unwrap();
        verify_detached(&mut &b"<repomd/>"[..], &armored, &fixtures::public_keys()).unwrap();
        assert!(verify_detached(&mut &b"<repomd />"[..], &armored, &fixtures::public_keys()).is_err());
        assert!(
            verify_detached(&mut &b"<repomd/>"[..], &armored, &fixtures::other_public_keys())
                .is_err()
        );
    }

    #[tokio::test]
    async fn signs_beside_the_original() {
        let store = Arc::new(MemoryStore::new());
        let content = b"<repomd/>".repeat(20_000);
        store.insert("repo", "repodata/repomd.xml", content.clone(), "text/xml");
        let ctx = Context::new(store.clone(), Arc::new(MemorySecretStore::new()));

        let dest = sign_detached(
            &ctx,
            &fixtures::keyring(),
            &ObjectLocation::new("repo", "repodata/repomd.xml"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(dest.key, "repodata/repomd.xml.asc");

        let sig = store.object("repo", "repodata/repomd.xml.asc").unwrap();
        assert_eq!(sig.content_type, CONTENT_TYPE_SIGNATURE);
        let armored = String::from_utf8(sig.data.to_vec()).unwrap();
        verify_detached(&mut &content[..], &armored, &fixtures::public_keys()).unwrap();

        let original = store.object("repo", "repodata/repomd.xml").unwrap();
        assert_eq!(original.data, content);
    }

    #[tokio::test]
    async fn missing_object_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let ctx = Context::new(store.clone(), Arc::new(MemorySecretStore::new()));
        let result = sign_detached(
            &ctx,
            &fixtures::keyring(),
            &ObjectLocation::new("repo", "gone.xml"),
        )
        .await
        .unwrap();
        assert!(result.is_none());
        assert!(store.keys("repo").is_empty());
    }

    #[tokio::test]
    async fn cancelled_signing_uploads_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert("repo", "repodata/repomd.xml", b"<repomd/>".to_vec(), "text/xml");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = Context::new(store.clone(), Arc::new(MemorySecretStore::new())).with_cancel(cancel);

        let err = sign_detached(
            &ctx,
            &fixtures::keyring(),
            &ObjectLocation::new("repo", "repodata/repomd.xml"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled(_)));
        assert!(store.object("repo", "repodata/repomd.xml.asc").is_none());
    }
}

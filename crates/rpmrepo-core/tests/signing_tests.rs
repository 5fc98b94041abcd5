//! Integration tests for signing and verification.

use rpmrepo_core::package::{PackageBuilder, PackageParser, RpmHeaderParser};
use rpmrepo_core::secrets::MemorySecretStore;
use rpmrepo_core::signing::{PublicKeys, verify_detached, verify_package};
use rpmrepo_core::storage::{CONTENT_TYPE_RPM, MemoryStore, ObjectLocation};
use rpmrepo_core::{
    Context, ErrorKind, ObjectEvent, SignOutcome, SigningConfig, TargetConfig, sign_metadata,
    sign_packages,
};
use std::sync::Arc;

const KEY_SECRET: &str = "rpmrepo/signing-key";
const PASSPHRASE_SECRET: &str = "rpmrepo/signing-passphrase";
const SIGNING_KEY: &str = include_str!("fixtures/keys/signing.asc");
const SIGNING_PUBLIC: &str = include_str!("fixtures/keys/signing.pub.asc");
const PROTECTED_KEY: &str = include_str!("fixtures/keys/protected.asc");
const PROTECTED_PUBLIC: &str = include_str!("fixtures/keys/protected.pub.asc");

struct TestContext {
    store: Arc<MemoryStore>,
    ctx: Context,
    keys: PublicKeys,
    signing: SigningConfig,
}

impl TestContext {
    fn new() -> Self {
        let secrets = MemorySecretStore::new()
            .with(KEY_SECRET, SIGNING_KEY)
            .with(PASSPHRASE_SECRET, "correct horse\n");
        let store = Arc::new(MemoryStore::new());
        let ctx = Context::new(store.clone(), Arc::new(secrets));
        Self {
            store,
            ctx,
            keys: PublicKeys::from_armored(SIGNING_PUBLIC.as_bytes()).unwrap(),
            signing: SigningConfig::new(Some(KEY_SECRET.to_string()), None).unwrap(),
        }
    }

    fn add_package(&self, bucket: &str, key: &str) -> Vec<u8> {
        let bytes = PackageBuilder::new("foo", "1.0", "1", "x86_64")
            .file("/usr/bin/foo", &[42u8; 10_000])
            .build()
            .unwrap();
        self.store.insert(bucket, key, bytes.clone(), CONTENT_TYPE_RPM);
        bytes
    }

    fn assert_signed(&self, bucket: &str, key: &str) {
        let object = self.store.object(bucket, key).expect("signed package missing");
        assert_eq!(object.content_type, CONTENT_TYPE_RPM);
        verify_package(&mut &object.data[..], &self.keys).unwrap();
        let header = RpmHeaderParser.parse(&mut &object.data[..]).unwrap();
        assert_eq!(header.name, "foo");
    }
}

fn target(bucket: Option<&str>, path: Option<&str>, base: Option<&str>) -> TargetConfig {
    TargetConfig::new(bucket.map(String::from), path.map(String::from), base.map(String::from)).unwrap()
}

#[tokio::test]
async fn test_sign_in_place() {
    let t = TestContext::new();
    t.add_package("incoming", "pool/foo.rpm");

    let outcomes = sign_packages(
        &t.ctx,
        &t.signing,
        &TargetConfig::default(),
        vec![ObjectEvent::new("incoming", "pool/foo.rpm")],
    )
    .await
    .unwrap();

    assert_eq!(
        outcomes,
        vec![SignOutcome::Signed(ObjectLocation::new("incoming", "pool/foo.rpm"))]
    );
    t.assert_signed("incoming", "pool/foo.rpm");
    assert_eq!(t.store.keys("incoming"), vec!["pool/foo.rpm"]);
}

#[tokio::test]
async fn test_sign_relocates_under_target_path() {
    let t = TestContext::new();
    t.add_package("packages", "incoming/sub/foo.rpm");

    sign_packages(
        &t.ctx,
        &t.signing,
        &target(None, Some("releases"), Some("incoming")),
        vec![ObjectEvent::new("packages", "incoming/sub/foo.rpm")],
    )
    .await
    .unwrap();

    t.assert_signed("packages", "releases/sub/foo.rpm");
    assert_eq!(t.store.keys("packages"), vec!["releases/sub/foo.rpm"]);
}

#[tokio::test]
async fn test_sign_relocates_to_target_path_without_base_path() {
    let t = TestContext::new();
    t.add_package("packages", "incoming/sub/foo.rpm");

    let outcomes = sign_packages(
        &t.ctx,
        &t.signing,
        &target(None, Some("releases/"), None),
        vec![ObjectEvent::new("packages", "incoming/sub/foo.rpm")],
    )
    .await
    .unwrap();

    assert_eq!(
        outcomes,
        vec![SignOutcome::Signed(ObjectLocation::new("packages", "releases/foo.rpm"))]
    );
    t.assert_signed("packages", "releases/foo.rpm");
    assert_eq!(t.store.keys("packages"), vec!["releases/foo.rpm"]);
}

#[tokio::test]
async fn test_protected_key_signs_with_passphrase_secret() {
    let t = TestContext::new();
    let secrets = MemorySecretStore::new()
        .with(KEY_SECRET, PROTECTED_KEY)
        .with(PASSPHRASE_SECRET, "correct horse\n");
    let ctx = Context::new(t.store.clone(), Arc::new(secrets));
    t.add_package("incoming", "foo.rpm");

    let signing = SigningConfig::new(
        Some(KEY_SECRET.to_string()),
        Some(PASSPHRASE_SECRET.to_string()),
    )
    .unwrap();
    sign_packages(
        &ctx,
        &signing,
        &TargetConfig::default(),
        vec![ObjectEvent::new("incoming", "foo.rpm")],
    )
    .await
    .unwrap();

    let object = t.store.object("incoming", "foo.rpm").unwrap();
    let protected = PublicKeys::from_armored(PROTECTED_PUBLIC.as_bytes()).unwrap();
    verify_package(&mut &object.data[..], &protected).unwrap();
    assert!(verify_package(&mut &object.data[..], &t.keys).is_err());
}

#[tokio::test]
async fn test_wrong_passphrase_is_fatal() {
    let t = TestContext::new();
    let secrets = MemorySecretStore::new()
        .with(KEY_SECRET, PROTECTED_KEY)
        .with(PASSPHRASE_SECRET, "battery staple");
    let ctx = Context::new(t.store.clone(), Arc::new(secrets));
    t.add_package("incoming", "foo.rpm");
    t.store.clear_operations();

    let signing = SigningConfig::new(
        Some(KEY_SECRET.to_string()),
        Some(PASSPHRASE_SECRET.to_string()),
    )
    .unwrap();
    let err = sign_packages(
        &ctx,
        &signing,
        &TargetConfig::default(),
        vec![ObjectEvent::new("incoming", "foo.rpm")],
    )
    .await
    .unwrap_err();
    assert!(err.is_fatal());
    assert!(t.store.operations().is_empty());
}

#[tokio::test]
async fn test_sign_to_other_bucket_deletes_original() {
    let t = TestContext::new();
    t.add_package("incoming", "foo.rpm");

    sign_packages(
        &t.ctx,
        &t.signing,
        &target(Some("signed"), None, None),
        vec![ObjectEvent::new("incoming", "foo.rpm")],
    )
    .await
    .unwrap();

    t.assert_signed("signed", "foo.rpm");
    assert!(t.store.keys("incoming").is_empty());
}

#[tokio::test]
async fn test_failed_upload_keeps_original() {
    let t = TestContext::new();
    let original = t.add_package("incoming", "foo.rpm");
    t.add_package("incoming", "bar.rpm");
    t.store.fail_put("signed", "foo.rpm");

    let err = sign_packages(
        &t.ctx,
        &t.signing,
        &target(Some("signed"), None, None),
        vec![
            ObjectEvent::new("incoming", "foo.rpm"),
            ObjectEvent::new("incoming", "bar.rpm"),
        ],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    assert_eq!(t.store.object("incoming", "foo.rpm").unwrap().data, original);
    // The rest of the batch still ran.
    t.assert_signed("signed", "bar.rpm");
}

#[tokio::test]
async fn test_vanished_and_non_package_objects_are_skipped() {
    let t = TestContext::new();
    t.store.insert("incoming", "notes.txt", &b"hi"[..], "text/plain");

    let outcomes = sign_packages(
        &t.ctx,
        &t.signing,
        &TargetConfig::default(),
        vec![
            ObjectEvent::new("incoming", "notes.txt"),
            ObjectEvent::new("incoming", "gone.rpm"),
        ],
    )
    .await
    .unwrap();
    assert_eq!(
        outcomes,
        vec![SignOutcome::Skipped(ObjectLocation::new("incoming", "gone.rpm"))]
    );
    assert_eq!(t.store.object("incoming", "notes.txt").unwrap().data, &b"hi"[..]);
}

#[tokio::test]
async fn test_invalid_package_is_parse_error() {
    let t = TestContext::new();
    t.store.insert("incoming", "bad.rpm", &b"not an rpm"[..], CONTENT_TYPE_RPM);

    let err = sign_packages(
        &t.ctx,
        &t.signing,
        &target(Some("signed"), None, None),
        vec![ObjectEvent::new("incoming", "bad.rpm")],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(t.store.object("incoming", "bad.rpm").is_some());
    assert!(t.store.keys("signed").is_empty());
}

#[tokio::test]
async fn test_missing_key_secret_fails_before_any_work() {
    let t = TestContext::new();
    t.add_package("incoming", "foo.rpm");
    let signing = SigningConfig::new(Some("absent".to_string()), None).unwrap();
    t.store.clear_operations();

    let err = sign_packages(
        &t.ctx,
        &signing,
        &TargetConfig::default(),
        vec![ObjectEvent::new("incoming", "foo.rpm")],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(t.store.operations().is_empty());
}

#[tokio::test]
async fn test_detached_signature_for_repomd() {
    let t = TestContext::new();
    let repomd = b"<?xml version=\"1.0\"?>\n<repomd/>\n".to_vec();
    t.store.insert("repo", "repodata/repomd.xml", repomd.clone(), "text/xml");

    let outcomes = sign_metadata(
        &t.ctx,
        &t.signing,
        vec![
            ObjectEvent::new("repo", "repodata/repomd.xml"),
            ObjectEvent::new("repo", "repodata/repomd.xml.asc"),
        ],
    )
    .await
    .unwrap();
    assert_eq!(
        outcomes,
        vec![SignOutcome::Signed(ObjectLocation::new("repo", "repodata/repomd.xml.asc"))]
    );

    let armored = t.store.object("repo", "repodata/repomd.xml.asc").unwrap();
    let armored = String::from_utf8(armored.data.to_vec()).unwrap();
    assert!(armored.starts_with("-----BEGIN PGP SIGNATURE-----"));
    verify_detached(&mut &repomd[..], &armored, &t.keys).unwrap();
    assert_eq!(t.store.object("repo", "repodata/repomd.xml").unwrap().data, repomd);
}

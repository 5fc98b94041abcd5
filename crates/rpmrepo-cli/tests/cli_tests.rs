//! Integration tests for the rpmrepo CLI.

use rpmrepo_core::package::PackageBuilder;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const SIGNING_KEY: &str = include_str!("fixtures/keys/signing.asc");
const SIGNING_PUBLIC: &str = include_str!("fixtures/keys/signing.pub.asc");
const OTHER_PUBLIC: &str = include_str!("fixtures/keys/protected.pub.asc");

/// Temporary store root, secrets directory and key pair.
struct TestContext {
    temp_dir: TempDir,
    store_root: PathBuf,
    secrets_dir: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store_root = temp_dir.path().join("store");
        let secrets_dir = temp_dir.path().join("secrets");
        std::fs::create_dir_all(&store_root).expect("failed to create store root");
        std::fs::create_dir_all(&secrets_dir).expect("failed to create secrets dir");
        Self {
            temp_dir,
            store_root,
            secrets_dir,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rpmrepo"));
        cmd.env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("RUST_LOG", "warn");
        cmd
    }

    fn batch_cmd(&self, subcommand: &str, event: &Path) -> Command {
        let mut cmd = self.cmd();
        cmd.arg(subcommand)
            .arg("--store")
            .arg("fs")
            .arg("--store-root")
            .arg(&self.store_root)
            .arg("--secrets")
            .arg("file")
            .arg("--secrets-dir")
            .arg(&self.secrets_dir)
            .arg("--event")
            .arg(event);
        cmd
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    fn object(&self, bucket: &str, key: &str) -> PathBuf {
        self.store_root.join(bucket).join(key)
    }

    fn put_package(&self, bucket: &str, key: &str) {
        let path = self.object(bucket, key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let bytes = PackageBuilder::new("foo", "1.0", "1", "x86_64")
            .file("/usr/bin/foo", b"payload")
            .build()
            .unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    /// Install the private key as the `signing-key` secret and return the
    /// path of its public key.
    fn install_key(&self) -> PathBuf {
        std::fs::write(self.secrets_dir.join("signing-key"), SIGNING_KEY).unwrap();
        let public = self.path("public.asc");
        std::fs::write(&public, SIGNING_PUBLIC).unwrap();
        public
    }

    fn verify(&self, file: &Path, key: &Path, signature: Option<&Path>) -> Output {
        let mut cmd = self.cmd();
        cmd.arg("verify").arg(file).arg("--key").arg(key);
        if let Some(signature) = signature {
            cmd.arg("--signature").arg(signature);
        }
        cmd.output().expect("failed to run rpmrepo")
    }

    fn write_event(&self, bucket: &str, keys: &[&str]) -> PathBuf {
        let records: Vec<serde_json::Value> = keys
            .iter()
            .map(|key| serde_json::json!({ "s3": { "bucket": { "name": bucket }, "object": { "key": key } } }))
            .collect();
        let body = serde_json::json!({ "Records": records }).to_string();
        let batch = serde_json::json!({ "Records": [{ "body": body }] });
        let path = self.path("event.json");
        std::fs::write(&path, batch.to_string()).unwrap();
        path
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.cmd().arg("--help").output().expect("failed to run rpmrepo");
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("sign-package"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.cmd().arg("--version").output().expect("failed to run rpmrepo");
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("rpmrepo"));
}

#[test]
fn test_index_publishes_metadata() {
    let ctx = TestContext::new();
    ctx.put_package("repo", "pool/foo-1.0-1.x86_64.rpm");
    let event = ctx.write_event("repo", &["pool/foo-1.0-1.x86_64.rpm"]);

    let output = ctx.batch_cmd("index", &event).output().expect("failed to run rpmrepo");
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains(r#""outcome":"published""#));

    assert!(ctx.object("repo", "repodata/primary.xml.gz").exists());
    assert!(ctx.object("repo", "repodata/filelists.xml.gz").exists());
    let repomd = std::fs::read_to_string(ctx.object("repo", "repodata/repomd.xml")).unwrap();
    assert!(repomd.contains(r#"<data type="primary">"#));

    // Second delivery changes nothing.
    let output = ctx.batch_cmd("index", &event).output().expect("failed to run rpmrepo");
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains(r#""outcome":"unchanged""#));
    assert_eq!(
        std::fs::read_to_string(ctx.object("repo", "repodata/repomd.xml")).unwrap(),
        repomd
    );
}

#[test]
fn test_malformed_event_fails() {
    let ctx = TestContext::new();
    let event = ctx.path("event.json");
    std::fs::write(&event, r#"{"Records":[{"body":"{broken"}]}"#).unwrap();

    let output = ctx.batch_cmd("index", &event).output().expect("failed to run rpmrepo");
    assert!(!output.status.success());
}

#[test]
fn test_sign_package_and_verify() {
    let ctx = TestContext::new();
    let public = ctx.install_key();
    ctx.put_package("packages", "incoming/sub/foo.rpm");
    let event = ctx.write_event("packages", &["incoming/sub/foo.rpm"]);

    let output = ctx
        .batch_cmd("sign-package", &event)
        .arg("--signing-key-secret")
        .arg("signing-key")
        .arg("--target-path")
        .arg("releases")
        .arg("--base-path")
        .arg("incoming")
        .output()
        .expect("failed to run rpmrepo");
    assert_success(&output);

    let signed = ctx.object("packages", "releases/sub/foo.rpm");
    assert!(signed.exists());
    assert!(!ctx.object("packages", "incoming/sub/foo.rpm").exists());

    assert_success(&ctx.verify(&signed, &public, None));

    let other = ctx.path("other.asc");
    std::fs::write(&other, OTHER_PUBLIC).unwrap();
    assert!(!ctx.verify(&signed, &other, None).status.success());
}

#[test]
fn test_sign_package_without_base_path_keeps_file_name() {
    let ctx = TestContext::new();
    let public = ctx.install_key();
    ctx.put_package("packages", "incoming/sub/foo.rpm");
    let event = ctx.write_event("packages", &["incoming/sub/foo.rpm"]);

    let output = ctx
        .batch_cmd("sign-package", &event)
        .arg("--signing-key-secret")
        .arg("signing-key")
        .arg("--target-path")
        .arg("releases/")
        .output()
        .expect("failed to run rpmrepo");
    assert_success(&output);

    let signed = ctx.object("packages", "releases/foo.rpm");
    assert_success(&ctx.verify(&signed, &public, None));
    assert!(!ctx.object("packages", "incoming/sub/foo.rpm").exists());
}

#[test]
fn test_sign_metadata_and_verify_detached() {
    let ctx = TestContext::new();
    let public = ctx.install_key();
    let repomd = ctx.object("repo", "repodata/repomd.xml");
    std::fs::create_dir_all(repomd.parent().unwrap()).unwrap();
    std::fs::write(&repomd, "<repomd/>\n").unwrap();
    let event = ctx.write_event("repo", &["repodata/repomd.xml"]);

    let output = ctx
        .batch_cmd("sign-metadata", &event)
        .arg("--signing-key-secret")
        .arg("signing-key")
        .output()
        .expect("failed to run rpmrepo");
    assert_success(&output);

    let signature = ctx.object("repo", "repodata/repomd.xml.asc");
    assert!(std::fs::read_to_string(&signature).unwrap().starts_with("-----BEGIN PGP SIGNATURE-----"));
    assert_success(&ctx.verify(&repomd, &public, Some(&signature)));
    assert_eq!(std::fs::read_to_string(&repomd).unwrap(), "<repomd/>\n");
}

#[test]
fn test_missing_signing_key_setting_fails_before_work() {
    let ctx = TestContext::new();
    ctx.put_package("packages", "foo.rpm");
    let event = ctx.write_event("packages", &["foo.rpm"]);

    let output = ctx.batch_cmd("sign-package", &event).output().expect("failed to run rpmrepo");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("RPMREPO_SECRET_SIGNING_KEY"));
    assert!(ctx.object("packages", "foo.rpm").exists());
}

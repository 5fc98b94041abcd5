//! Checksums and the streaming accumulators that produce them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;

/// Algorithm tag written into `type` attributes for SHA-256 digests.
pub const SHA256: &str = "sha256";

/// A digest paired with the name of the algorithm that produced it.
///
/// Serialized as `<checksum type="sha256">hex</checksum>`. Two checksums are
/// equal only when both the algorithm and the digest match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Checksum {
    /// Algorithm tag (e.g. `sha256`).
    #[serde(rename = "@type")]
    pub algorithm: String,
    /// Lowercase hex digest.
    #[serde(rename = "$text", default)]
    pub digest: String,
}

impl Checksum {
    /// Create a SHA-256 checksum from an already computed hex digest.
    pub fn sha256(digest: impl Into<String>) -> Self {
        Self {
            algorithm: SHA256.to_string(),
            digest: digest.into(),
        }
    }

    /// Compute the SHA-256 checksum of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self::sha256(hex::encode(Sha256::digest(data)))
    }

    /// Return the hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.digest
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Rolling SHA-256 accumulator that also counts the bytes fed to it.
///
/// Implements [`io::Write`] so it can sit anywhere in a writer chain
/// (typically on one side of a [`TeeWriter`](crate::TeeWriter)).
#[derive(Debug, Clone, Default)]
pub struct ChecksumWriter {
    hasher: Sha256,
    bytes: u64,
}

impl ChecksumWriter {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes without going through the `io::Write` interface.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Digest of everything written so far. The accumulator keeps running.
    pub fn sum(&self) -> Checksum {
        Checksum::sha256(hex::encode(self.hasher.clone().finalize()))
    }
}

impl io::Write for ChecksumWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Duplicates every write into two sinks, `primary` first.
///
/// The write only succeeds once both sinks accepted the full buffer, so the
/// two sides never observe different byte streams.
#[derive(Debug)]
pub struct TeeWriter<A, B> {
    primary: A,
    secondary: B,
}

impl<A: io::Write, B: io::Write> TeeWriter<A, B> {
    /// Fan writes out to `primary` and `secondary`.
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    /// Borrow both sinks.
    pub fn get_ref(&self) -> (&A, &B) {
        (&self.primary, &self.secondary)
    }

    /// Recover both sinks.
    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.secondary)
    }
}

impl<A: io::Write, B: io::Write> io::Write for TeeWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.secondary.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn equality_requires_algorithm_and_digest() {
        let a = Checksum::sha256("abc123");
        let b = Checksum {
            algorithm: "sha1".to_string(),
            digest: "abc123".to_string(),
        };
        assert_ne!(a, b);
        assert_eq!(a, Checksum::sha256("abc123"));
    }

    #[test]
    fn writer_matches_one_shot_digest() {
        let mut writer = ChecksumWriter::new();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();

        assert_eq!(writer.sum(), Checksum::compute(b"hello world"));
        assert_eq!(writer.bytes_written(), 11);
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            Checksum::compute(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn tee_feeds_both_sides() {
        let mut tee = TeeWriter::new(ChecksumWriter::new(), Vec::new());
        tee.write_all(b"payload").unwrap();
        let (sum, bytes) = tee.into_inner();
        assert_eq!(bytes, b"payload");
        assert_eq!(sum.sum(), Checksum::compute(b"payload"));
    }
}

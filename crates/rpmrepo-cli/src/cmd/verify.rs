//! Verify command

use anyhow::{Context, Result};
use rpmrepo_core::signing::{PublicKeys, verify_detached, verify_package};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Check a package's embedded signature, or a detached signature over any file.
///
/// # Errors
///
/// Unreadable inputs, an unusable public key or a signature that does not
/// verify.
pub fn verify(file: &Path, key: &Path, signature: Option<&Path>) -> Result<()> {
    let armored_key = std::fs::read(key)
        .with_context(|| format!("Failed to read public key {}", key.display()))?;
    let key = PublicKeys::from_armored(&armored_key)
        .with_context(|| format!("Failed to load public key {}", key.display()))?;

    let mut input = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );
    let checked = match signature {
        Some(path) => {
            let armored = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read signature {}", path.display()))?;
            verify_detached(&mut input, &armored, &key)
        }
        None => verify_package(&mut input, &key),
    };
    checked.with_context(|| format!("Signature check failed for {}", file.display()))?;

    println!("OK {}", file.display());
    Ok(())
}

//! Assemble small packages.
//!
//! Produces real RPMs through `rpm::PackageBuilder` with a fixed build time,
//! so equal inputs give equal bytes. Used by the test suites and by
//! `rpmrepo` smoke checks against a live store.

use rpm::{
    BuildConfig, FileOptions, Header, HeaderEntry, IndexData, IndexTag, Package,
    SignatureHeaderBuilder,
};

/// Build time stamped into every package.
pub const BUILD_TIME: u32 = 1_700_000_000;

/// Builder for a small binary or source package.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    name: String,
    version: String,
    release: String,
    arch: String,
    epoch: Option<u32>,
    source: bool,
    files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    /// Start a package with no files.
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            epoch: None,
            source: false,
            files: Vec::new(),
        }
    }

    /// Set the epoch. Without one the header carries no epoch tag.
    #[must_use]
    pub fn epoch(mut self, epoch: u32) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Mark as a source package.
    #[must_use]
    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    /// Add a regular file at an absolute `path`.
    #[must_use]
    pub fn file(mut self, path: &str, contents: &[u8]) -> Self {
        self.files.push((path.to_string(), contents.to_vec()));
        self
    }

    /// Encode the package.
    ///
    /// # Errors
    ///
    /// Propagates `rpm` builder failures, e.g. a relative file path.
    pub fn build(&self) -> Result<Vec<u8>, rpm::Error> {
        self.build_edited(|_| {})
    }

    /// Encode the package after `edit` has rewritten the main header entries.
    ///
    /// The signature header digests are recomputed, so the result is
    /// internally consistent whatever the edit did.
    ///
    /// # Errors
    ///
    /// Propagates `rpm` builder and header encoding failures.
    pub fn build_edited(
        &self,
        edit: impl FnOnce(&mut Vec<HeaderEntry>),
    ) -> Result<Vec<u8>, rpm::Error> {
        let mut builder = rpm::PackageBuilder::new(
            &self.name,
            &self.version,
            "MIT",
            &self.arch,
            "rpmrepo test package",
        );
        builder
            .release(self.release.as_str())
            .using_config(BuildConfig::v4().source_date(BUILD_TIME));
        if let Some(epoch) = self.epoch {
            builder.epoch(epoch);
        }
        for (path, contents) in &self.files {
            builder.with_file_contents(contents.clone(), FileOptions::new(path.as_str()))?;
        }
        let mut package = builder.build()?;

        let mut entries: Vec<HeaderEntry> = package
            .metadata
            .header
            .get_all_entries()?
            .into_iter()
            .filter(|(tag, _)| *tag != IndexTag::RPMTAG_HEADERIMMUTABLE as u32)
            .map(|(tag, data)| HeaderEntry::new(tag, data))
            .collect();
        if self.source {
            entries.retain(|entry| entry.tag != IndexTag::RPMTAG_SOURCERPM as u32);
            entries.push(HeaderEntry::new(
                IndexTag::RPMTAG_SOURCEPACKAGE as u32,
                IndexData::Int32(vec![1]),
            ));
        }
        edit(&mut entries);
        rewrite_header(&mut package, entries)?;

        let mut bytes = Vec::new();
        package.write(&mut bytes)?;
        Ok(bytes)
    }
}

fn rewrite_header(package: &mut Package, entries: Vec<HeaderEntry>) -> Result<(), rpm::Error> {
    package.metadata.header = Header::from_entries(entries, IndexTag::RPMTAG_HEADERIMMUTABLE);
    let header_bytes = package.header_bytes()?;
    let content_length = header_bytes.len() as u64 + package.payload.len() as u64;
    package.metadata.signature = SignatureHeaderBuilder::from_existing(&package.metadata.signature)?
        .calculate_digests(&header_bytes)
        .set_content_length(content_length)
        .build()?;
    Ok(())
}

//! The repository aggregate: the three documents that are read, merged and
//! written back together.

use crate::checksum::Checksum;
use crate::filelists::{FileList, FileListData};
use crate::primary::{Location, Package, PackageChecksum, PackageList, Size, PACKAGE_TYPE};
use crate::repomd::{DataKind, RepoMd, RepoMdData};
use crate::version::Version;

/// Key of the index-of-indexes, relative to the bucket root.
pub const REPOMD_KEY: &str = "repodata/repomd.xml";
/// Key of the package list.
pub const PRIMARY_KEY: &str = "repodata/primary.xml.gz";
/// Key of the file list.
pub const FILELISTS_KEY: &str = "repodata/filelists.xml.gz";

/// Metadata extracted from one package artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPackage {
    /// Object key of the artifact.
    pub key: String,
    /// Package name.
    pub name: String,
    /// Architecture.
    pub arch: String,
    /// Epoch/version/release.
    pub version: Version,
    /// Whole-artifact checksum.
    pub checksum: Checksum,
    /// Archive, package and installed sizes.
    pub size: Size,
    /// Installed paths.
    pub files: Vec<String>,
}

impl ScannedPackage {
    /// Entry for the package list.
    pub fn to_package(&self) -> Package {
        Package {
            kind: PACKAGE_TYPE.to_string(),
            name: self.name.clone(),
            arch: self.arch.clone(),
            version: self.version.clone(),
            location: Location::new(self.key.clone()),
            size: self.size,
            checksum: PackageChecksum::flagged(self.checksum.clone()),
        }
    }

    /// Entry for the file list, addressed by the artifact digest.
    pub fn to_filelist(&self) -> FileList {
        FileList {
            pkgid: self.checksum.digest.clone(),
            name: self.name.clone(),
            arch: self.arch.clone(),
            version: self.version.clone(),
            files: self.files.clone(),
        }
    }
}

/// The three index documents of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    /// Index-of-indexes.
    pub repomd: RepoMd,
    /// Package list.
    pub primary: PackageList,
    /// File list.
    pub filelists: FileListData,
}

impl Repository {
    /// Assemble a repository from already loaded documents.
    pub fn new(repomd: RepoMd, primary: PackageList, filelists: FileListData) -> Self {
        Self {
            repomd,
            primary,
            filelists,
        }
    }

    /// Merge scanned packages into the package and file lists.
    ///
    /// Returns `true` when either list gained or replaced an entry. A file
    /// list entry is rewritten whenever its package entry changes, and added
    /// when it is missing even if the package entry was already current.
    /// Feeding the same packages twice returns `false` the second time so the
    /// caller can skip publishing.
    pub fn update(&mut self, packages: &[ScannedPackage]) -> bool {
        let mut changed = false;
        for pkg in packages {
            let package_changed = self.primary.add(pkg.to_package());
            let filelist_missing = self.filelists.find(&pkg.checksum.digest).is_none();
            if package_changed || filelist_missing {
                changed = true;
                self.filelists.add(pkg.to_filelist());
            }
        }
        changed
    }

    /// Point the index record for `kind` at a freshly written document.
    pub fn refresh_index_record(
        &mut self,
        kind: DataKind,
        location: impl Into<String>,
        object: Checksum,
        content: Checksum,
        now: i64,
    ) {
        self.repomd.upsert(RepoMdData::new(
            kind,
            Location::new(location),
            object,
            content,
            now,
        ));
    }
}

//! The file list document (`repodata/filelists.xml.gz`).

use crate::version::Version;
use crate::xml::XmlDocument;
use serde::{Deserialize, Serialize};

/// Namespace of the `filelists` root element.
pub const FILELISTS_NAMESPACE: &str = "http://linux.duke.edu/metadata/filelists";

fn filelists_namespace() -> String {
    FILELISTS_NAMESPACE.to_string()
}

/// Installed paths of one package, addressed by the package checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    /// Hex digest of the package file this list belongs to.
    #[serde(rename = "@pkgid")]
    pub pkgid: String,
    /// Package name.
    #[serde(rename = "@name")]
    pub name: String,
    /// Package architecture.
    #[serde(rename = "@arch")]
    pub arch: String,
    /// Epoch/version/release.
    pub version: Version,
    /// Installed paths, in header order.
    #[serde(rename = "file", default)]
    pub files: Vec<String>,
}

/// The `filelists` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListData {
    #[serde(rename = "@xmlns", skip_deserializing, default = "filelists_namespace")]
    xmlns: String,
    #[serde(rename = "@packages", default)]
    count: usize,
    #[serde(rename = "package", default)]
    packages: Vec<FileList>,
}

impl Default for FileListData {
    fn default() -> Self {
        Self {
            xmlns: filelists_namespace(),
            count: 0,
            packages: Vec::new(),
        }
    }
}

impl FileListData {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared `packages` count.
    pub fn count(&self) -> usize {
        self.count
    }

    /// All entries in document order.
    pub fn packages(&self) -> &[FileList] {
        &self.packages
    }

    /// Look up an entry by package id.
    pub fn find(&self, pkgid: &str) -> Option<&FileList> {
        self.packages.iter().find(|f| f.pkgid == pkgid)
    }

    /// Insert an entry, replacing any entry with the same package id.
    ///
    /// Always reports a change: a file list is only ever persisted together
    /// with a package list change.
    pub fn add(&mut self, list: FileList) -> bool {
        match self.packages.iter_mut().find(|f| f.pkgid == list.pkgid) {
            Some(existing) => *existing = list,
            None => self.packages.push(list),
        }
        self.count = self.packages.len();
        true
    }
}

impl XmlDocument for FileListData {
    const ROOT: &'static str = "filelists";

    fn normalize(&mut self) {
        self.count = self.packages.len();
    }
}

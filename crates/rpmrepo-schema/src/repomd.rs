//! The index-of-indexes (`repodata/repomd.xml`).

use crate::checksum::Checksum;
use crate::primary::Location;
use crate::xml::XmlDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of the `repomd` root element.
pub const REPO_NAMESPACE: &str = "http://linux.duke.edu/metadata/repo";

fn repo_namespace() -> String {
    REPO_NAMESPACE.to_string()
}

/// Which document a metadata record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// The package list.
    Primary,
    /// The file list.
    Filelists,
}

impl DataKind {
    /// Type tag written into `data@type`.
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Primary => "primary",
            DataKind::Filelists => "filelists",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `data` element of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMdData {
    /// Type tag (`primary`, `filelists`, ...).
    #[serde(rename = "@type")]
    pub kind: String,
    /// Key of the stored document relative to the repository root.
    pub location: Location,
    /// Unix time of the write that produced this record.
    #[serde(default)]
    pub timestamp: i64,
    /// Checksum of the stored (compressed) bytes.
    pub checksum: Checksum,
    /// Checksum of the uncompressed document.
    #[serde(rename = "open-checksum")]
    pub open_checksum: Checksum,
}

impl RepoMdData {
    /// Build a record for `kind`. Both checksums come from the same write.
    pub fn new(
        kind: DataKind,
        location: Location,
        object: Checksum,
        content: Checksum,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            location,
            timestamp,
            checksum: object,
            open_checksum: content,
        }
    }
}

/// The `repomd` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMd {
    #[serde(rename = "@xmlns", skip_deserializing, default = "repo_namespace")]
    xmlns: String,
    #[serde(rename = "data", default)]
    data: Vec<RepoMdData>,
}

impl Default for RepoMd {
    fn default() -> Self {
        Self {
            xmlns: repo_namespace(),
            data: Vec::new(),
        }
    }
}

impl RepoMd {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in document order.
    pub fn data(&self) -> &[RepoMdData] {
        &self.data
    }

    /// Record for a given kind, if any.
    pub fn get(&self, kind: DataKind) -> Option<&RepoMdData> {
        self.data.iter().find(|d| d.kind == kind.as_str())
    }

    /// Insert `record`, replacing the record with the same type tag in place.
    pub fn upsert(&mut self, record: RepoMdData) {
        match self.data.iter_mut().find(|d| d.kind == record.kind) {
            Some(existing) => *existing = record,
            None => self.data.push(record),
        }
    }
}

impl XmlDocument for RepoMd {
    const ROOT: &'static str = "repomd";

    // Duplicate type tags collapse to the last one, at the first one's position.
    fn normalize(&mut self) {
        let records = std::mem::take(&mut self.data);
        for record in records {
            self.upsert(record);
        }
    }
}

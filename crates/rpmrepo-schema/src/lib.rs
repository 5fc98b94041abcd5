//! Data model and XML wire format of a yum/dnf repository index.
//!
//! The crate has no I/O of its own: documents encode into any
//! [`std::io::Write`] sink and decode from text, so the storage layer can
//! stream them through compressors and hashers.

pub mod checksum;
pub mod filelists;
pub mod primary;
pub mod repomd;
pub mod repository;
pub mod version;
pub mod xml;

// Re-exports
pub use checksum::{Checksum, ChecksumWriter, SHA256, TeeWriter};
pub use filelists::{FileList, FileListData};
pub use primary::{Location, Package, PackageChecksum, PackageList, Size};
pub use repomd::{DataKind, RepoMd, RepoMdData};
pub use repository::{FILELISTS_KEY, PRIMARY_KEY, REPOMD_KEY, Repository, ScannedPackage};
pub use version::Version;
pub use xml::{SchemaError, XmlDocument};

/// Suffix of package artifacts picked up by the indexer.
pub const PACKAGE_SUFFIX: &str = ".rpm";

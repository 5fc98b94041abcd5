//! The package list document (`repodata/primary.xml.gz`).

use crate::checksum::Checksum;
use crate::version::Version;
use crate::xml::XmlDocument;
use serde::{Deserialize, Serialize};

/// Namespace of the `metadata` root element.
pub const COMMON_NAMESPACE: &str = "http://linux.duke.edu/metadata/common";
/// Namespace bound to the `rpm:` prefix.
pub const RPM_NAMESPACE: &str = "http://linux.duke.edu/metadata/rpm";
/// Value written into `checksum@pkgid` for every package entry.
pub const PKGID_FLAG: &str = "YES";
/// Type tag of every package entry.
pub const PACKAGE_TYPE: &str = "rpm";

fn common_namespace() -> String {
    COMMON_NAMESPACE.to_string()
}

fn rpm_namespace() -> String {
    RPM_NAMESPACE.to_string()
}

fn package_type() -> String {
    PACKAGE_TYPE.to_string()
}

/// `location@href`, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Location {
    /// Relative object key.
    #[serde(rename = "@href")]
    pub href: String,
}

impl Location {
    /// Create a location from a relative key.
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// Package sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Size {
    /// Size of the uncompressed payload archive.
    #[serde(rename = "@archive", default)]
    pub archive: u64,
    /// Size of the package file itself.
    #[serde(rename = "@package", default)]
    pub package: u64,
    /// Total size of the installed files.
    #[serde(rename = "@installed", default)]
    pub installed: u64,
}

/// Package checksum with the `pkgid` flag attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PackageChecksum {
    /// Always [`PKGID_FLAG`] for entries written by this crate.
    #[serde(rename = "@pkgid", default)]
    pub pkgid: String,
    /// Algorithm tag.
    #[serde(rename = "@type")]
    pub algorithm: String,
    /// Hex digest of the whole package file.
    #[serde(rename = "$text", default)]
    pub digest: String,
}

impl PackageChecksum {
    /// Wrap a package checksum, setting the `pkgid` flag.
    pub fn flagged(checksum: Checksum) -> Self {
        Self {
            pkgid: PKGID_FLAG.to_string(),
            algorithm: checksum.algorithm,
            digest: checksum.digest,
        }
    }

    /// The checksum without the flag.
    pub fn checksum(&self) -> Checksum {
        Checksum {
            algorithm: self.algorithm.clone(),
            digest: self.digest.clone(),
        }
    }

    /// Compare algorithm and digest, ignoring the `pkgid` flag.
    pub fn same_digest(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.digest == other.digest
    }
}

/// One `package` element of the package list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Type tag, `rpm`.
    #[serde(rename = "@type", default = "package_type")]
    pub kind: String,
    /// Package name.
    pub name: String,
    /// Architecture (`x86_64`, `noarch`, `src`, ...).
    pub arch: String,
    /// Epoch/version/release.
    pub version: Version,
    /// Object key of the package relative to the repository root.
    pub location: Location,
    /// Archive, package and installed sizes.
    #[serde(default)]
    pub size: Size,
    /// Checksum of the package file.
    pub checksum: PackageChecksum,
}

impl Package {
    /// Name/architecture/version identity. Two entries with the same identity
    /// describe the same logical build.
    pub fn same_build(&self, other: &Self) -> bool {
        self.name == other.name && self.arch == other.arch && self.version == other.version
    }
}

/// The `metadata` document listing every package in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageList {
    #[serde(rename = "@xmlns", skip_deserializing, default = "common_namespace")]
    xmlns: String,
    #[serde(rename = "@xmlns:rpm", skip_deserializing, default = "rpm_namespace")]
    xmlns_rpm: String,
    #[serde(rename = "@packages", default)]
    count: usize,
    #[serde(rename = "package", default)]
    packages: Vec<Package>,
}

impl Default for PackageList {
    fn default() -> Self {
        Self {
            xmlns: common_namespace(),
            xmlns_rpm: rpm_namespace(),
            count: 0,
            packages: Vec::new(),
        }
    }
}

impl PackageList {
    /// Create an empty package list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared `packages` count.
    pub fn count(&self) -> usize {
        self.count
    }

    /// All entries in document order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Find an entry by name/arch/version.
    pub fn find(&self, pkg: &Package) -> Option<&Package> {
        self.packages.iter().find(|p| p.same_build(pkg))
    }

    /// Add a package, or replace the entry for the same build when its
    /// checksum differs.
    ///
    /// Returns `true` if the list changed. Re-adding an entry with the same
    /// identity and checksum is a no-op.
    pub fn add(&mut self, pkg: Package) -> bool {
        let changed = match self.packages.iter_mut().find(|p| p.same_build(&pkg)) {
            Some(existing) if existing.checksum.same_digest(&pkg.checksum) => false,
            Some(existing) => {
                *existing = pkg;
                true
            }
            None => {
                self.packages.push(pkg);
                true
            }
        };
        self.count = self.packages.len();
        changed
    }
}

impl XmlDocument for PackageList {
    const ROOT: &'static str = "metadata";

    fn normalize(&mut self) {
        self.count = self.packages.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo(digest: &str) -> Package {
        Package {
            kind: PACKAGE_TYPE.to_string(),
            name: "foo".to_string(),
            arch: "x86_64".to_string(),
            version: Version::new("0", "1.0", "1"),
            location: Location::new("foo-1.0-1.x86_64.rpm"),
            size: Size {
                archive: 10,
                package: 20,
                installed: 30,
            },
            checksum: PackageChecksum::flagged(Checksum::sha256(digest)),
        }
    }

    #[test]
    fn add_appends_new_build() {
        let mut list = PackageList::new();
        assert!(list.add(foo("abc123")));
        assert_eq!(list.count(), 1);
        assert_eq!(list.packages()[0].checksum.pkgid, PKGID_FLAG);
    }

    #[test]
    fn add_same_checksum_is_noop() {
        let mut list = PackageList::new();
        list.add(foo("abc123"));
        assert!(!list.add(foo("abc123")));
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn add_different_checksum_replaces_in_place() {
        let mut list = PackageList::new();
        let mut bar = foo("bar");
        bar.name = "bar".to_string();
        list.add(foo("abc123"));
        list.add(bar);

        assert!(list.add(foo("def456")));
        assert_eq!(list.count(), 2);
        assert_eq!(list.packages()[0].name, "foo");
        assert_eq!(list.packages()[0].checksum.digest, "def456");
    }

    #[test]
    fn different_version_is_a_new_entry() {
        let mut list = PackageList::new();
        list.add(foo("abc123"));
        let mut newer = foo("fff");
        newer.version = Version::new("0", "1.1", "1");
        assert!(list.add(newer));
        assert_eq!(list.count(), 2);
    }

    #[test]
    fn encodes_wire_format() {
        let mut list = PackageList::new();
        list.add(foo("abc123"));
        let xml = list.to_xml_string().unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<metadata"));
        assert!(xml.contains(r#"packages="1""#));
        assert!(xml.contains(r#"<package type="rpm">"#));
        assert!(xml.contains(r#"<version epoch="0" ver="1.0" rel="1"/>"#));
        assert!(xml.contains(r#"<location href="foo-1.0-1.x86_64.rpm"/>"#));
        assert!(xml.contains(r#"<size archive="10" package="20" installed="30"/>"#));
        assert!(xml.contains(r#"<checksum pkgid="YES" type="sha256">abc123</checksum>"#));
    }

    #[test]
    fn decode_restores_entries_and_count() {
        let mut list = PackageList::new();
        list.add(foo("abc123"));
        let xml = list.to_xml_string().unwrap();

        let decoded = PackageList::decode(&xml).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn decode_recomputes_wrong_count() {
        let xml = r#"<metadata packages="7">
            <package type="rpm">
              <name>foo</name><arch>noarch</arch>
              <version epoch="0" ver="2" rel="1"/>
              <location href="foo.rpm"/>
              <size archive="1" package="2" installed="3"/>
              <checksum pkgid="YES" type="sha256">aa</checksum>
            </package>
        </metadata>"#;
        let decoded = PackageList::decode(xml).unwrap();
        assert_eq!(decoded.count(), 1);
    }

    #[test]
    fn decode_empty_document() {
        let decoded = PackageList::decode(r#"<metadata packages="0"></metadata>"#).unwrap();
        assert_eq!(decoded.count(), 0);
        assert!(decoded.packages().is_empty());
    }
}

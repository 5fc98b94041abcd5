//! Package build versions.

use serde::{Deserialize, Serialize};

/// Epoch/version/release triple of a package build.
///
/// Components are opaque strings: two versions are the same build when all
/// three components match. No ordering is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Version {
    /// Epoch (`0` when the package declares none).
    #[serde(rename = "@epoch", default)]
    pub epoch: String,
    /// Upstream version.
    #[serde(rename = "@ver", default)]
    pub ver: String,
    /// Package release.
    #[serde(rename = "@rel", default)]
    pub rel: String,
}

impl Version {
    /// Build a version from its three components.
    pub fn new(epoch: impl Into<String>, ver: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            epoch: epoch.into(),
            ver: ver.into(),
            rel: rel.into(),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch.is_empty() || self.epoch == "0" {
            write!(f, "{}-{}", self.ver, self.rel)
        } else {
            write!(f, "{}:{}-{}", self.epoch, self.ver, self.rel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_component_wise() {
        let a = Version::new("0", "1.0", "1");
        assert_eq!(a, Version::new("0", "1.0", "1"));
        assert_ne!(a, Version::new("1", "1.0", "1"));
        assert_ne!(a, Version::new("0", "1.0", "2"));
    }

    #[test]
    fn display_hides_zero_epoch() {
        assert_eq!(Version::new("0", "1.0", "1").to_string(), "1.0-1");
        assert_eq!(Version::new("2", "1.0", "1").to_string(), "2:1.0-1");
    }
}

//! Destination of a signed package.

use crate::config::TargetConfig;
use crate::storage::ObjectLocation;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Where the signed copy of `source` goes.
///
/// The bucket is replaced when a target bucket is set. With a target path
/// but no base path, the package lands directly under the target path. With
/// both, the base path is stripped from the source directory on whole
/// segments and the target path is prepended; sources outside the base path
/// keep their full directory. The file name never changes.
pub fn destination(target: &TargetConfig, source: &ObjectLocation) -> ObjectLocation {
    let bucket = target.bucket.clone().unwrap_or_else(|| source.bucket.clone());
    let Some(prefix) = &target.path else {
        return ObjectLocation::new(bucket, source.key.clone());
    };

    let (dir, file) = source.key.rsplit_once('/').unwrap_or(("", source.key.as_str()));
    let dir: Vec<&str> = segments(dir).collect();
    let relative = match target.base_path.as_deref() {
        None => &[][..],
        Some(base) => {
            let base: Vec<&str> = segments(base).collect();
            if dir.starts_with(&base) {
                &dir[base.len()..]
            } else {
                &dir[..]
            }
        }
    };

    let key = segments(prefix)
        .chain(relative.iter().copied())
        .chain(std::iter::once(file))
        .collect::<Vec<_>>()
        .join("/");
    ObjectLocation::new(bucket, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(bucket: Option<&str>, path: Option<&str>, base: Option<&str>) -> TargetConfig {
        TargetConfig::new(
            bucket.map(String::from),
            path.map(String::from),
            base.map(String::from),
        )
        .unwrap()
    }

    fn src(key: &str) -> ObjectLocation {
        ObjectLocation::new("incoming-bucket", key)
    }

    #[test]
    fn in_place_keeps_location() {
        let dest = destination(&target(None, None, None), &src("incoming/sub/foo.rpm"));
        assert_eq!(dest, src("incoming/sub/foo.rpm"));
    }

    #[test]
    fn bucket_only_keeps_key() {
        let dest = destination(&target(Some("signed"), None, None), &src("a/foo.rpm"));
        assert_eq!(dest, ObjectLocation::new("signed", "a/foo.rpm"));
    }

    #[test]
    fn base_path_is_replaced_by_target_path() {
        let t = target(None, Some("releases"), Some("incoming"));
        assert_eq!(
            destination(&t, &src("incoming/sub/foo.rpm")).key,
            "releases/sub/foo.rpm"
        );
        assert_eq!(destination(&t, &src("incoming/foo.rpm")).key, "releases/foo.rpm");
    }

    #[test]
    fn base_path_matches_whole_segments_only() {
        let t = target(None, Some("releases/"), Some("/incoming/"));
        assert_eq!(
            destination(&t, &src("incoming-old/foo.rpm")).key,
            "releases/incoming-old/foo.rpm"
        );
        assert_eq!(destination(&t, &src("other/x/foo.rpm")).key, "releases/other/x/foo.rpm");
    }

    #[test]
    fn target_path_without_base_uses_file_name() {
        let t = target(Some("signed"), Some("pool"), None);
        assert_eq!(
            destination(&t, &src("foo.rpm")),
            ObjectLocation::new("signed", "pool/foo.rpm")
        );
        assert_eq!(destination(&t, &src("a/b/foo.rpm")).key, "pool/foo.rpm");

        let t = target(None, Some("releases/"), None);
        assert_eq!(
            destination(&t, &src("incoming/sub/foo.rpm")),
            src("releases/foo.rpm")
        );
    }
}

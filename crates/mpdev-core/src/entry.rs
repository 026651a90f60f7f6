//! Local and remote filesystem entries

use std::path::PathBuf;

/// Kind of a local entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Folder,
}

/// One entry of the local project tree
///
/// Produced once per run by [`crate::local::enumerate`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalEntry {
    /// Path relative to the root, always with `/` separators
    pub relative_path: String,
    /// Full path on disk
    pub absolute_path: PathBuf,
    /// File or folder
    pub kind: EntryKind,
}

impl LocalEntry {
    /// Final path component
    pub fn name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// True for regular files
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// True if `other` lies strictly below this entry
    pub fn contains(&self, other: &LocalEntry) -> bool {
        other.relative_path.len() > self.relative_path.len() + 1
            && other.relative_path.starts_with(&self.relative_path)
            && other.relative_path.as_bytes()[self.relative_path.len()] == b'/'
    }
}

/// A path on the device
///
/// The narrow command channel has no reliable stat call, so whether a remote
/// path is a file is guessed by [`looks_like_file`]. Remote entries are never
/// cached across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteEntry {
    path: String,
}

impl RemoteEntry {
    /// Create an entry from a path as reported by the device
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_remote_path(path),
        }
    }

    /// Normalized path (forward slashes, no leading `/`)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Heuristic file classification, see [`looks_like_file`]
    pub fn looks_like_file(&self) -> bool {
        looks_like_file(&self.path)
    }
}

/// Guess whether a remote path names a file
///
/// Device filesystems reachable through the listing command do not report
/// entry types. A name containing a `.` is taken to be a file, anything else
/// a directory. This misclassifies `v1.2/` directories and extensionless
/// files; keep every classification going through this one predicate.
pub fn looks_like_file(path: &str) -> bool {
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    name.contains('.')
}

/// Convert a device path to forward slashes without leading or trailing `/`
pub fn normalize_remote_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    unified.trim_matches('/').to_string()
}

/// Key used to compare local and remote paths: normalized and lowercased
pub fn comparison_key(path: &str) -> String {
    normalize_remote_path(path).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_file() {
        assert!(looks_like_file("main.py"));
        assert!(looks_like_file("/lib/module.mpy"));
        assert!(!looks_like_file("lib"));
        assert!(!looks_like_file("/lib/drivers/"));
        // Known limitation of the heuristic
        assert!(looks_like_file("v1.2"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_remote_path("\\lib\\a.py"), "lib/a.py");
        assert_eq!(normalize_remote_path("/boot.py"), "boot.py");
        assert_eq!(comparison_key("/Lib/A.PY"), "lib/a.py");
    }

    #[test]
    fn test_contains() {
        let folder = LocalEntry {
            relative_path: "pkg".into(),
            absolute_path: PathBuf::from("/p/pkg"),
            kind: EntryKind::Folder,
        };
        let inner = LocalEntry {
            relative_path: "pkg/b.py".into(),
            absolute_path: PathBuf::from("/p/pkg/b.py"),
            kind: EntryKind::File,
        };
        let sibling = LocalEntry {
            relative_path: "pkg2/c.py".into(),
            absolute_path: PathBuf::from("/p/pkg2/c.py"),
            kind: EntryKind::File,
        };
        assert!(folder.contains(&inner));
        assert!(!folder.contains(&sibling));
        assert_eq!(inner.name(), "b.py");
    }
}

//! Local File Enumerator
//!
//! Walks a project root and produces a flat inventory of files and folders,
//! skipping anything matched by an exclusion pattern. Excluded folders are not
//! descended into.

use crate::entry::{EntryKind, LocalEntry};
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Exclusion patterns
///
/// A pattern starting with `*` matches entries whose name ends with the rest
/// of the pattern (`*.log`). Any other pattern matches when it occurs anywhere
/// in the entry's absolute path (`__pycache__`, `.git`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    patterns: Vec<String>,
}

impl Exclusions {
    /// Build from patterns, dropping empty ones and duplicates
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        set.extend(patterns);
        set
    }

    /// Parse a comma-separated list (`.vscode,__pycache__,*.log`)
    pub fn parse_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Add more patterns
    pub fn extend<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for p in patterns {
            let p = p.as_ref().trim().replace('\\', "/");
            if !p.is_empty() && !self.patterns.contains(&p) {
                self.patterns.push(p);
            }
        }
    }

    /// Configured patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if `path` matches any pattern
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// First pattern that matches `path`
    pub fn matching_pattern(&self, path: &Path) -> Option<&str> {
        let full = path.to_string_lossy().replace('\\', "/");
        let name = full.rsplit('/').next().unwrap_or(&full);
        self.patterns
            .iter()
            .find(|pattern| match pattern.strip_prefix('*') {
                Some(suffix) => name.ends_with(suffix),
                None => full.contains(pattern.as_str()),
            })
            .map(String::as_str)
    }
}

/// Enumerate every file and folder below `root`
///
/// Entries are emitted parent-first, siblings in name order. A root that is
/// not a readable directory is a fatal error.
pub fn enumerate(root: &Path, exclusions: &Exclusions) -> Result<Vec<LocalEntry>> {
    if !root.is_dir() {
        return Err(Error::InvalidRoot(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    // Patterns match anywhere in the path, so a root below a matching
    // folder hides every entry
    if let Some(pattern) = exclusions.matching_pattern(root) {
        log::warn!(
            "Exclusion pattern '{}' matches the project root {}; nothing will be enumerated",
            pattern,
            root.display()
        );
    }

    let mut entries = Vec::new();
    walk(root, root, exclusions, &mut entries)?;
    log::debug!(
        "Enumerated {} local entries under {}",
        entries.len(),
        root.display()
    );
    Ok(entries)
}

fn walk(
    root: &Path,
    dir: &Path,
    exclusions: &Exclusions,
    out: &mut Vec<LocalEntry>,
) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let path = child.path();
        if exclusions.is_excluded(&path) {
            log::trace!("Excluded {}", path.display());
            continue;
        }

        let is_dir = child.file_type()?.is_dir();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| Error::InvalidRoot(format!("{} escapes root", path.display())))?;
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(LocalEntry {
            relative_path,
            absolute_path: path.clone(),
            kind: if is_dir {
                EntryKind::Folder
            } else {
                EntryKind::File
            },
        });

        if is_dir {
            walk(root, &path, exclusions, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), b"print('hi')").unwrap();
        fs::write(root.join("debug.log"), b"noise").unwrap();
        fs::create_dir_all(root.join("lib/drivers")).unwrap();
        fs::write(root.join("lib/drivers/led.py"), b"").unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("__pycache__/main.cpython.pyc"), b"").unwrap();
        dir
    }

    #[test]
    fn test_enumerate_all() {
        let dir = project();
        let entries = enumerate(dir.path(), &Exclusions::default()).unwrap();
        let rel: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(
            rel,
            vec![
                "__pycache__",
                "__pycache__/main.cpython.pyc",
                "debug.log",
                "lib",
                "lib/drivers",
                "lib/drivers/led.py",
                "main.py",
            ]
        );
        let lib = entries.iter().find(|e| e.relative_path == "lib").unwrap();
        assert_eq!(lib.kind, EntryKind::Folder);
        assert_eq!(lib.absolute_path, dir.path().join("lib"));
    }

    #[test]
    fn test_exclusions_never_leak() {
        let dir = project();
        let exclusions = Exclusions::parse_list("__pycache__, *.log");
        let entries = enumerate(dir.path(), &exclusions).unwrap();
        for entry in &entries {
            assert!(
                !exclusions.is_excluded(&entry.absolute_path),
                "{} should have been excluded",
                entry.absolute_path.display()
            );
        }
        assert!(entries.iter().any(|e| e.relative_path == "main.py"));
        assert!(!entries.iter().any(|e| e.relative_path.contains("pycache")));
        assert!(!entries.iter().any(|e| e.relative_path.ends_with(".log")));
    }

    #[test]
    fn test_excluded_folder_not_descended() {
        let dir = project();
        let entries = enumerate(dir.path(), &Exclusions::new(["drivers"])).unwrap();
        assert!(entries.iter().any(|e| e.relative_path == "lib"));
        assert!(!entries.iter().any(|e| e.relative_path.starts_with("lib/drivers")));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = project();
        let err = enumerate(&dir.path().join("main.py"), &Exclusions::default()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Fatal);
    }

    #[test]
    fn test_root_below_excluded_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build/proj");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.py"), b"").unwrap();

        let exclusions = Exclusions::new(["build", "*.log"]);
        assert_eq!(exclusions.matching_pattern(&root), Some("build"));
        assert!(enumerate(&root, &exclusions).unwrap().is_empty());

        let exclusions = Exclusions::new(["*.log"]);
        assert_eq!(exclusions.matching_pattern(&root), None);
        assert_eq!(enumerate(&root, &exclusions).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_list_dedups() {
        let ex = Exclusions::parse_list(".git, .git,,*.log ");
        assert_eq!(ex.patterns(), &[".git".to_string(), "*.log".to_string()]);
    }
}

//! Remote File Enumerator
//!
//! Produces a flat inventory of the files on the device by issuing listing
//! requests through a [`Transport`]. Entries that do not look like files are
//! listed again as directories. Listing failures below the root are recorded
//! as warnings and the subtree is skipped, since some device filesystems
//! reject a listing on a leaf.
//!
//! An inventory reflects the device at the time of the call only; it must be
//! recomputed before every delete or upload decision.

use crate::entry::{looks_like_file, normalize_remote_path, RemoteEntry};
use crate::error::{Error, ErrorKind, Result};
use crate::transport::Transport;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Directories deeper than this are not descended into
pub const MAX_DEPTH: usize = 32;

/// A listing that failed and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingWarning {
    /// Remote path that could not be listed
    pub path: String,
    /// Why
    pub reason: String,
}

/// Flat, deduplicated set of remote file paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInventory {
    entries: Vec<RemoteEntry>,
    warnings: Vec<ListingWarning>,
}

impl RemoteInventory {
    /// Build an inventory from known entries, dropping duplicates
    pub fn from_entries(entries: Vec<RemoteEntry>) -> Self {
        let mut seen = HashSet::new();
        Self {
            entries: entries
                .into_iter()
                .filter(|e| seen.insert(e.path().to_string()))
                .collect(),
            warnings: Vec::new(),
        }
    }

    /// File entries in discovery order
    pub fn entries(&self) -> &[RemoteEntry] {
        &self.entries
    }

    /// Normalized paths in discovery order
    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.path().to_string()).collect()
    }

    /// Subtrees that were skipped
    pub fn warnings(&self) -> &[ListingWarning] {
        &self.warnings
    }

    /// True if no file was found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// List every file below `path` on the device
///
/// Failing to list `path` itself, and connection or fatal errors anywhere,
/// abort the walk; any other listing failure only skips the failing subtree.
pub async fn list_remote<T>(transport: &mut T, path: &str) -> Result<RemoteInventory>
where
    T: Transport + ?Sized,
{
    let mut inventory = RemoteInventory::default();
    let mut seen_files = HashSet::new();
    let mut visited_dirs = HashSet::new();
    let mut queue = VecDeque::new();

    let start = normalize_remote_path(path);
    visited_dirs.insert(start.clone());
    queue.push_back((start, 0usize));

    while let Some((dir, depth)) = queue.pop_front() {
        let items = match transport.list_entries(&dir).await {
            Ok(items) => items,
            // An unreadable start path says nothing about the device contents
            Err(e) if depth == 0 => return Err(e),
            Err(e) if matches!(e.kind(), ErrorKind::Connection | ErrorKind::Fatal) => {
                return Err(e)
            }
            Err(e) => {
                let warning = ListingWarning {
                    path: dir.clone(),
                    reason: e.to_string(),
                };
                log::warn!("Skipping remote '{}': {}", warning.path, warning.reason);
                inventory.warnings.push(warning);
                continue;
            }
        };

        for item in items {
            let child = child_path(&dir, &item);
            if child.is_empty() {
                continue;
            }

            // A leaf that echoes itself when listed is a file without a dot
            if looks_like_file(&child) || child == dir {
                if seen_files.insert(child.clone()) {
                    inventory.entries.push(RemoteEntry::new(&child));
                }
                continue;
            }

            if depth + 1 > MAX_DEPTH {
                let warning = ListingWarning {
                    path: child,
                    reason: format!("deeper than {} levels", MAX_DEPTH),
                };
                log::warn!("Skipping remote '{}': {}", warning.path, warning.reason);
                inventory.warnings.push(warning);
                continue;
            }

            if visited_dirs.insert(child.clone()) {
                queue.push_back((child, depth + 1));
            }
        }
    }

    log::debug!(
        "Remote inventory: {} files, {} skipped listings",
        inventory.len(),
        inventory.warnings.len()
    );
    Ok(inventory)
}

/// Resolve a listed item against the directory it was listed from
///
/// Devices either print full paths (`/lib/a.py`) or bare names (`a.py`).
fn child_path(dir: &str, item: &str) -> String {
    let absolute = item.trim_start().starts_with(['/', '\\']);
    let item = normalize_remote_path(item);
    if absolute || dir.is_empty() || item.starts_with(&format!("{}/", dir)) {
        item
    } else {
        format!("{}/{}", dir, item)
    }
}

/// Render paths as an indented tree, folders first appearing where needed
///
/// ```text
/// boot.py
/// lib/
///     drivers/
///         led.py
/// ```
pub fn tree_lines(paths: &[String]) -> Vec<String> {
    let sorted: BTreeSet<String> = paths.iter().map(|p| normalize_remote_path(p)).collect();
    let mut seen_dirs = HashSet::new();
    let mut lines = Vec::new();

    for path in &sorted {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let mut prefix = String::new();
        for (depth, part) in parts.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            let indent = "    ".repeat(depth);
            if depth + 1 < parts.len() {
                if seen_dirs.insert(prefix.clone()) {
                    lines.push(format!("{}{}/", indent, part));
                }
            } else {
                lines.push(format!("{}{}", indent, part));
            }
        }
    }
    lines
}

/// Error for a listing that the device refused, for transports to reuse
pub fn listing_error(path: &str, reason: impl Into<String>) -> Error {
    Error::Listing {
        path: path.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::progress::ProgressSink;
    use crate::transport::{FirmwareOp, TransferJob};
    use std::collections::HashMap;

    /// Channel answering listings from a fixed table
    struct ScriptedChannel {
        endpoint: Endpoint,
        listings: HashMap<String, Vec<String>>,
        calls: Vec<String>,
    }

    impl ScriptedChannel {
        fn new(table: &[(&str, &[&str])]) -> Self {
            Self {
                endpoint: Endpoint::Serial("test".into()),
                listings: table
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                    .collect(),
                calls: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedChannel {
        fn endpoint(&self) -> &Endpoint {
            &self.endpoint
        }

        async fn list_entries(&mut self, path: &str) -> Result<Vec<String>> {
            self.calls.push(path.to_string());
            self.listings
                .get(path)
                .cloned()
                .ok_or_else(|| listing_error(path, "ENOENT"))
        }

        async fn delete_file(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_dir(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn make_dir(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn put_file(
            &mut self,
            _job: &mut TransferJob,
            _progress: &mut dyn ProgressSink,
        ) -> Result<()> {
            Ok(())
        }

        async fn run_firmware_op(
            &mut self,
            _op: &FirmwareOp,
            _progress: &mut dyn ProgressSink,
        ) -> Result<String> {
            Err(Error::Unsupported("firmware"))
        }
    }

    #[tokio::test]
    async fn test_recursive_listing_emits_only_leaves() {
        let mut channel = ScriptedChannel::new(&[
            ("", &["/boot.py", "/lib", "/main.py"]),
            ("lib", &["/lib/drivers", "/lib/util.py"]),
            ("lib/drivers", &["led.py", "/lib/drivers/motor.py"]),
        ]);
        let inv = list_remote(&mut channel, "").await.unwrap();
        let mut paths = inv.paths();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "boot.py",
                "lib/drivers/led.py",
                "lib/drivers/motor.py",
                "lib/util.py",
                "main.py"
            ]
        );
        assert!(inv.entries().iter().all(|e| e.looks_like_file()));
        assert!(inv.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_failing_subtree_is_skipped() {
        // "README" has no dot and cannot be listed
        let mut channel = ScriptedChannel::new(&[("", &["/README", "/a.py"])]);
        let inv = list_remote(&mut channel, "").await.unwrap();
        assert_eq!(inv.paths(), vec!["a.py"]);
        assert_eq!(inv.warnings().len(), 1);
        assert_eq!(inv.warnings()[0].path, "README");
    }

    #[tokio::test]
    async fn test_self_listing_directory_terminates() {
        // Device that answers a listing of a dotless leaf with the leaf itself,
        // and a cyclic directory that lists its parent
        let mut channel = ScriptedChannel::new(&[
            ("", &["/LICENSE", "/loop"]),
            ("LICENSE", &["/LICENSE"]),
            ("loop", &["/loop/inner"]),
            ("loop/inner", &["/loop"]),
        ]);
        let inv = list_remote(&mut channel, "").await.unwrap();
        assert_eq!(inv.paths(), vec!["LICENSE"]);
        assert_eq!(channel.calls.len(), 4);
    }

    #[tokio::test]
    async fn test_duplicates_removed() {
        let mut channel = ScriptedChannel::new(&[("", &["/a.py", "a.py", "\\a.py"])]);
        let inv = list_remote(&mut channel, "").await.unwrap();
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn test_tree_lines() {
        let lines = tree_lines(&[
            "lib/drivers/led.py".to_string(),
            "boot.py".to_string(),
            "lib/util.py".to_string(),
        ]);
        assert_eq!(
            lines,
            vec![
                "boot.py",
                "lib/",
                "    drivers/",
                "        led.py",
                "    util.py"
            ]
        );
    }
}

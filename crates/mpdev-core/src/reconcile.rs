//! Reconciliation Engine
//!
//! Given the local inventory, the user's selection and a fresh remote
//! inventory, decide what to delete from the device and what to upload.
//!
//! Two modes exist:
//!
//! - **Full replace** wipes every remote file and uploads the selection. It is
//!   destructive and requires authorization whenever the device is not empty.
//! - **Selective overlap** deletes only the remote files that are about to be
//!   overwritten. Everything else on the device survives.
//!
//! Paths are compared case-insensitively with `/` separators and no leading
//! slash, see [`comparison_key`].

use crate::entry::{comparison_key, LocalEntry};
use crate::remote::RemoteInventory;
use std::collections::HashSet;

/// How a sync reconciles the device with the selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Delete everything remote, then upload the selection
    #[default]
    FullReplace,
    /// Delete only what is about to be overwritten
    SelectiveOverlap,
}

/// Result of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Remote paths to delete, in remote inventory order
    pub delete: Vec<String>,
    /// Local files to upload, parents before children
    pub upload: Vec<LocalEntry>,
    /// A destructive wipe of a non-empty device needs the user's approval
    pub needs_authorization: bool,
}

impl ReconcilePlan {
    /// Nothing to delete and nothing to upload
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty() && self.upload.is_empty()
    }
}

/// Expand a selection to the files it covers
///
/// Selected files are kept; selected folders contribute every file of the
/// inventory below them. Duplicates are removed and inventory order is kept.
pub fn expand_selection(selection: &[LocalEntry], inventory: &[LocalEntry]) -> Vec<LocalEntry> {
    let mut chosen = HashSet::new();
    for entry in selection {
        if entry.is_file() {
            chosen.insert(entry.relative_path.as_str());
        } else {
            for inner in inventory.iter().filter(|e| e.is_file() && entry.contains(e)) {
                chosen.insert(inner.relative_path.as_str());
            }
        }
    }

    let mut files: Vec<LocalEntry> = inventory
        .iter()
        .filter(|e| e.is_file() && chosen.remove(e.relative_path.as_str()))
        .cloned()
        .collect();

    // Selected files that the inventory does not know about (e.g. picked
    // outside the root walk) still go up, after the known ones
    for entry in selection {
        if entry.is_file() && chosen.remove(entry.relative_path.as_str()) {
            files.push(entry.clone());
        }
    }
    files
}

/// Compute the delete and upload sets
///
/// `remote` must have been listed immediately before the call.
pub fn plan(
    mode: ReconcileMode,
    selection: &[LocalEntry],
    inventory: &[LocalEntry],
    remote: &RemoteInventory,
) -> ReconcilePlan {
    let upload = expand_selection(selection, inventory);

    let delete = match mode {
        ReconcileMode::FullReplace => remote.paths(),
        ReconcileMode::SelectiveOverlap => {
            let wanted: HashSet<String> = upload
                .iter()
                .map(|e| comparison_key(&e.relative_path))
                .collect();
            remote
                .entries()
                .iter()
                .filter(|r| wanted.contains(&comparison_key(r.path())))
                .map(|r| r.path().to_string())
                .collect()
        }
    };

    let needs_authorization = mode == ReconcileMode::FullReplace && !remote.is_empty();

    log::debug!(
        "Reconcile {:?}: {} to delete, {} to upload",
        mode,
        delete.len(),
        upload.len()
    );

    ReconcilePlan {
        delete,
        upload,
        needs_authorization,
    }
}

/// Remote directories that must exist before `files` can be uploaded
///
/// Every ancestor is listed once, shallow ones first.
pub fn required_dirs(files: &[LocalEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dirs = Vec::new();
    for file in files {
        let parts: Vec<&str> = file.relative_path.split('/').collect();
        for depth in 1..parts.len() {
            let dir = parts[..depth].join("/");
            if seen.insert(dir.clone()) {
                dirs.push(dir);
            }
        }
    }
    dirs.sort_by_key(|d| d.matches('/').count());
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryKind, RemoteEntry};
    use std::path::PathBuf;

    fn file(rel: &str) -> LocalEntry {
        LocalEntry {
            relative_path: rel.into(),
            absolute_path: PathBuf::from("/proj").join(rel),
            kind: EntryKind::File,
        }
    }

    fn folder(rel: &str) -> LocalEntry {
        LocalEntry {
            relative_path: rel.into(),
            absolute_path: PathBuf::from("/proj").join(rel),
            kind: EntryKind::Folder,
        }
    }

    fn remote(paths: &[&str]) -> RemoteInventory {
        RemoteInventory::from_entries(paths.iter().map(|p| RemoteEntry::new(p)).collect())
    }

    fn inventory() -> Vec<LocalEntry> {
        vec![file("a.py"), folder("pkg"), file("pkg/b.py")]
    }

    #[test]
    fn test_selective_scenario() {
        let inv = inventory();
        let selection = vec![file("a.py"), folder("pkg")];
        let plan = plan(
            ReconcileMode::SelectiveOverlap,
            &selection,
            &inv,
            &remote(&["/a.py", "/old.py"]),
        );
        assert_eq!(plan.delete, vec!["a.py"]);
        let uploads: Vec<_> = plan.upload.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(uploads, vec!["a.py", "pkg/b.py"]);
        assert!(!plan.needs_authorization);
    }

    #[test]
    fn test_selective_never_deletes_outside_selection() {
        let inv = inventory();
        let selection = vec![file("pkg/b.py")];
        let plan = plan(
            ReconcileMode::SelectiveOverlap,
            &selection,
            &inv,
            &remote(&["a.py", "PKG/B.PY", "boot.py"]),
        );
        assert_eq!(plan.delete, vec!["PKG/B.PY"]);
    }

    #[test]
    fn test_full_replace_deletes_everything() {
        let inv = inventory();
        let plan = plan(
            ReconcileMode::FullReplace,
            &[folder("pkg")],
            &inv,
            &remote(&["boot.py", "lib/x.py"]),
        );
        assert_eq!(plan.delete, vec!["boot.py", "lib/x.py"]);
        assert!(plan.needs_authorization);
    }

    #[test]
    fn test_full_replace_on_empty_device_needs_no_authorization() {
        let inv = inventory();
        let plan = plan(ReconcileMode::FullReplace, &inv, &inv, &remote(&[]));
        assert!(!plan.needs_authorization);
        assert_eq!(plan.upload.len(), 2);
    }

    #[test]
    fn test_expand_removes_duplicates() {
        let inv = inventory();
        let files = expand_selection(&[folder("pkg"), file("pkg/b.py")], &inv);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_required_dirs() {
        let dirs = required_dirs(&[file("a.py"), file("lib/drivers/led.py"), file("lib/x.py")]);
        assert_eq!(dirs, vec!["lib", "lib/drivers"]);
    }
}

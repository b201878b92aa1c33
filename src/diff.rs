//! Edit scripts between two manifests.
//!
//! [`diff`] turns the manifest of a live tree into the operations that make
//! it match a stored one. Scripts are produced in four phases:
//!
//! 1. permission changes that make the tree writable (or only widen access),
//! 2. removals, deepest paths first,
//! 3. creations, shallowest paths first,
//! 4. permission changes that narrow access, deepest paths first.
//!
//! Within a phase, ties are broken lexicographically by path so identical
//! inputs always produce identical scripts.

use crate::manifest::{Entry, EntryKind, Manifest};
use crate::utils::hash::ContentHash;
use crate::utils::paths;
use crate::utils::permissions::FilePermissions;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{Level, debug, span};

/// Owner write bit, needed on a directory to add or remove its children
const OWNER_WRITE: u32 = 0o200;

/// One filesystem operation, addressed by `/`-separated relative path
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOp {
    CreateDir { path: String },
    RemoveDir { path: String },
    WriteFile { path: String, hash: ContentHash, mode: u32 },
    RemoveFile { path: String },
    CreateSymlink { path: String, target: String },
    RemoveSymlink { path: String },
    SetMode { path: String, mode: u32 },
}

impl EditOp {
    /// Path the operation acts on
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::CreateDir { path }
            | Self::RemoveDir { path }
            | Self::WriteFile { path, .. }
            | Self::RemoveFile { path }
            | Self::CreateSymlink { path, .. }
            | Self::RemoveSymlink { path }
            | Self::SetMode { path, .. } => path,
        }
    }

    /// Short verb naming the operation
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::CreateDir { .. } => "create-dir",
            Self::RemoveDir { .. } => "remove-dir",
            Self::WriteFile { .. } => "write-file",
            Self::RemoveFile { .. } => "remove-file",
            Self::CreateSymlink { .. } => "create-symlink",
            Self::RemoveSymlink { .. } => "remove-symlink",
            Self::SetMode { .. } => "set-mode",
        }
    }

    /// Whether the operation deletes something
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::RemoveDir { .. } | Self::RemoveFile { .. } | Self::RemoveSymlink { .. }
        )
    }

    /// Whether the operation brings something into existence or replaces its content
    #[must_use]
    pub const fn is_creation(&self) -> bool {
        matches!(
            self,
            Self::CreateDir { .. } | Self::WriteFile { .. } | Self::CreateSymlink { .. }
        )
    }

    fn removal_for(entry: &Entry) -> Self {
        let path = entry.path.clone();
        match entry.kind {
            EntryKind::File | EntryKind::Special => Self::RemoveFile { path },
            EntryKind::Directory => Self::RemoveDir { path },
            EntryKind::Symlink => Self::RemoveSymlink { path },
        }
    }

    fn creation_for(entry: &Entry) -> Option<Self> {
        let path = entry.path.clone();
        match entry.kind {
            EntryKind::Directory => Some(Self::CreateDir { path }),
            EntryKind::File => entry.content_hash.map(|hash| Self::WriteFile {
                path,
                hash,
                mode: entry.mode,
            }),
            EntryKind::Symlink => entry
                .link_target
                .clone()
                .map(|target| Self::CreateSymlink { path, target }),
            EntryKind::Special => None,
        }
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.path())?;
        match self {
            Self::WriteFile { mode, .. } | Self::SetMode { mode, .. } => write!(f, " ({mode:o})"),
            Self::CreateSymlink { target, .. } => write!(f, " -> {target}"),
            _ => Ok(()),
        }
    }
}

/// Ordered operations transforming one tree into another
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditScript {
    ops: Vec<EditOp>,
}

impl EditScript {
    /// Operations in application order
    #[must_use]
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the trees already match
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over the operations in order
    pub fn iter(&self) -> std::slice::Iter<'_, EditOp> {
        self.ops.iter()
    }
}

impl From<Vec<EditOp>> for EditScript {
    fn from(ops: Vec<EditOp>) -> Self {
        Self { ops }
    }
}

impl IntoIterator for EditScript {
    type Item = EditOp;
    type IntoIter = std::vec::IntoIter<EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a EditScript {
    type Item = &'a EditOp;
    type IntoIter = std::slice::Iter<'a, EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

fn shallow_first(a: &EditOp, b: &EditOp) -> Ordering {
    paths::depth(a.path())
        .cmp(&paths::depth(b.path()))
        .then_with(|| a.path().cmp(b.path()))
}

fn deep_first(a: &EditOp, b: &EditOp) -> Ordering {
    paths::depth(b.path())
        .cmp(&paths::depth(a.path()))
        .then_with(|| a.path().cmp(b.path()))
}

fn writable(mode: u32) -> bool {
    FilePermissions::from_mode(mode).owner_writable()
}

/// Compute the edit script that turns `from` into `to`.
///
/// A path whose kind, content or link target differs is removed and then
/// recreated. A path whose only difference is its permission bits gets a
/// `SetMode`. Symlink modes are ignored. Special files are only ever
/// removed, never created. Directories that must gain or lose children but are
/// not owner-writable are opened before the removals and restored after the
/// creations.
#[must_use]
pub fn diff(from: &Manifest, to: &Manifest) -> EditScript {
    let span = span!(Level::DEBUG, "diff", from = from.len(), to = to.len());
    let _enter = span.enter();

    let mut removals = Vec::new();
    let mut creations = Vec::new();
    let mut early_modes = Vec::new();
    let mut late_modes = Vec::new();
    // (path, live mode, wanted mode) for directories kept in place
    let mut kept_dirs = Vec::new();

    for current in from.entries() {
        let kept = to
            .get(&current.path)
            .is_some_and(|target| target.same_content(current));
        if !kept {
            removals.push(EditOp::removal_for(current));
        }
    }

    for target in to.entries() {
        match from.get(&target.path) {
            Some(current) if current.same_content(target) => {
                if target.kind == EntryKind::Directory {
                    kept_dirs.push((target.path.as_str(), current.mode, target.mode));
                } else if target.kind == EntryKind::File && current.mode != target.mode {
                    early_modes.push(EditOp::SetMode {
                        path: target.path.clone(),
                        mode: target.mode,
                    });
                }
            }
            _ => {
                creations.extend(EditOp::creation_for(target));
                if target.kind == EntryKind::Directory {
                    late_modes.push(EditOp::SetMode {
                        path: target.path.clone(),
                        mode: target.mode,
                    });
                }
            }
        }
    }

    // Directories whose children are added, removed or replaced
    let touched: BTreeSet<&str> = removals
        .iter()
        .chain(creations.iter())
        .filter_map(|op| paths::parent_of(op.path()))
        .collect();

    for (path, live, wanted) in kept_dirs {
        let needs_open = !writable(live) && touched.contains(path);
        if live != wanted && writable(wanted) {
            early_modes.push(EditOp::SetMode {
                path: path.to_string(),
                mode: wanted,
            });
        } else if needs_open {
            early_modes.push(EditOp::SetMode {
                path: path.to_string(),
                mode: live | OWNER_WRITE,
            });
        }
        if !writable(wanted) && (live != wanted || needs_open) {
            late_modes.push(EditOp::SetMode {
                path: path.to_string(),
                mode: wanted,
            });
        }
    }

    // Read-only directories on their way out still have to be emptied first
    for op in &removals {
        if let EditOp::RemoveDir { path } = op
            && let Some(current) = from.get(path)
            && !writable(current.mode)
            && touched.contains(path.as_str())
        {
            early_modes.push(EditOp::SetMode {
                path: path.clone(),
                mode: current.mode | OWNER_WRITE,
            });
        }
    }

    early_modes.sort_by(shallow_first);
    removals.sort_by(deep_first);
    creations.sort_by(shallow_first);
    late_modes.sort_by(deep_first);

    let mut ops = early_modes;
    ops.extend(removals);
    ops.extend(creations);
    ops.extend(late_modes);

    debug!(ops = ops.len(), "computed edit script");
    EditScript { ops }
}

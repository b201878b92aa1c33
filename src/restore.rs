//! Applies edit scripts to live folders.
//!
//! Operations run strictly in script order. The first failure stops the run:
//! work already done stays in place and the error lists every operation that
//! was never attempted. Running a fresh diff against the live tree picks up
//! from wherever the previous run stopped.

use crate::diff::{EditOp, EditScript};
use crate::error::{FoamError, Result};
use crate::store::ContentStore;
use crate::utils::paths::resolve_relative;
use crate::utils::permissions::FilePermissions;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, span, trace};

/// Prefix of the temporary files that file contents are staged in
pub const STAGING_PREFIX: &str = ".foam-restore-";

/// How files are materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Apply recorded permission bits. When off, written files get 0644 and
    /// `SetMode` operations are skipped.
    pub preserve_permissions: bool,
    /// Flush file contents to disk before renaming them into place
    pub fsync: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            fsync: true,
        }
    }
}

/// What a successful apply did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Operations carried out, including skipped mode changes
    pub applied: usize,
    /// Directories created
    pub dirs_created: usize,
    /// Directories removed
    pub dirs_removed: usize,
    /// Files written or rewritten
    pub files_written: usize,
    /// Files removed
    pub files_removed: usize,
    /// Symlinks created
    pub symlinks_created: usize,
    /// Symlinks removed
    pub symlinks_removed: usize,
    /// Permission changes applied
    pub modes_set: usize,
}

impl ApplyReport {
    fn record(&mut self, op: &EditOp, performed: bool) {
        self.applied += 1;
        if !performed {
            return;
        }
        let counter = match op {
            EditOp::CreateDir { .. } => &mut self.dirs_created,
            EditOp::RemoveDir { .. } => &mut self.dirs_removed,
            EditOp::WriteFile { .. } => &mut self.files_written,
            EditOp::RemoveFile { .. } => &mut self.files_removed,
            EditOp::CreateSymlink { .. } => &mut self.symlinks_created,
            EditOp::RemoveSymlink { .. } => &mut self.symlinks_removed,
            EditOp::SetMode { .. } => &mut self.modes_set,
        };
        *counter += 1;
    }

    /// Whether nothing on disk changed
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.dirs_created == 0
            && self.dirs_removed == 0
            && self.files_written == 0
            && self.files_removed == 0
            && self.symlinks_created == 0
            && self.symlinks_removed == 0
            && self.modes_set == 0
    }
}

/// Classify a filesystem failure while applying an operation
fn apply_error(path: &Path, err: io::Error) -> FoamError {
    match err.kind() {
        io::ErrorKind::AlreadyExists
        | io::ErrorKind::DirectoryNotEmpty
        | io::ErrorKind::IsADirectory
        | io::ErrorKind::NotADirectory => FoamError::conflict(path, err.to_string()),
        _ => FoamError::access(path, err),
    }
}

/// Applies edit scripts, pulling file contents from a [`ContentStore`]
pub struct RestoreExecutor<'a> {
    store: &'a ContentStore,
    options: RestoreOptions,
}

impl<'a> RestoreExecutor<'a> {
    /// Executor reading blobs from `store`
    #[must_use]
    pub const fn new(store: &'a ContentStore, options: RestoreOptions) -> Self {
        Self { store, options }
    }

    /// Apply `script` below `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FoamError::Interrupted`] wrapping the first failure, with
    /// the failed operation and the ones never attempted
    pub fn apply(&self, root: &Path, script: &EditScript) -> Result<ApplyReport> {
        let span = span!(Level::DEBUG, "apply", root = %root.display(), ops = script.len());
        let _enter = span.enter();

        let mut report = ApplyReport::default();
        for (index, op) in script.iter().enumerate() {
            trace!(%op, "applying");
            match self.apply_op(root, op) {
                Ok(performed) => report.record(op, performed),
                Err(cause) => {
                    debug!(%op, error = %cause, "restore stopped");
                    return Err(FoamError::Interrupted {
                        root: root.to_path_buf(),
                        failed: op.clone(),
                        applied: index,
                        remaining: script.ops()[index + 1..].to_vec(),
                        cause: Box::new(cause),
                    });
                }
            }
        }

        debug!(applied = report.applied, "restore complete");
        Ok(report)
    }

    /// Carry out one operation. Returns `false` when it turned out to be a no-op.
    fn apply_op(&self, root: &Path, op: &EditOp) -> Result<bool> {
        let path = resolve_relative(root, op.path());
        match op {
            EditOp::CreateDir { .. } => create_dir(&path),
            EditOp::RemoveDir { .. } => remove_dir(&path),
            EditOp::RemoveFile { .. } | EditOp::RemoveSymlink { .. } => remove_leaf(&path),
            EditOp::WriteFile { hash, mode, .. } => {
                let permissions = if self.options.preserve_permissions {
                    FilePermissions::from_mode(*mode)
                } else {
                    FilePermissions::default_file()
                };
                self.write_file(&path, hash, permissions)?;
                Ok(true)
            }
            EditOp::CreateSymlink { target, .. } => {
                create_symlink(target, &path)?;
                Ok(true)
            }
            EditOp::SetMode { mode, .. } => {
                if !self.options.preserve_permissions {
                    return Ok(false);
                }
                FilePermissions::from_mode(*mode)
                    .apply_to_path(&path)
                    .map_err(|e| apply_error(&path, e))?;
                Ok(true)
            }
        }
    }

    /// Stage the blob next to `path`, then rename it over the destination
    fn write_file(
        &self,
        path: &Path,
        hash: &crate::utils::hash::ContentHash,
        permissions: FilePermissions,
    ) -> Result<()> {
        if let Ok(existing) = fs::symlink_metadata(path)
            && existing.is_dir()
        {
            return Err(FoamError::conflict(path, "a directory occupies the file path"));
        }

        let parent = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&parent)
            .map_err(|e| apply_error(&parent, e))?;

        self.store.copy_to(hash, staged.as_file_mut(), path)?;
        if self.options.fsync {
            staged
                .as_file()
                .sync_all()
                .map_err(|e| FoamError::access(path, e))?;
        }
        permissions
            .apply_to_path(staged.path())
            .map_err(|e| FoamError::access(path, e))?;
        staged
            .persist(path)
            .map_err(|e| apply_error(path, e.error))?;
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let existing = fs::symlink_metadata(path).map_err(|e| apply_error(path, e))?;
            if existing.is_dir() {
                Ok(false)
            } else {
                Err(FoamError::conflict(path, "something other than a directory is in the way"))
            }
        }
        Err(e) => Err(apply_error(path, e)),
    }
}

fn remove_dir(path: &Path) -> Result<bool> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(apply_error(path, e)),
    }
}

/// Remove a file or symlink; a directory at the path is a conflict
fn remove_leaf(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(existing) if existing.is_dir() => {
            return Err(FoamError::conflict(path, "expected a file, found a directory"));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(apply_error(path, e)),
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(apply_error(path, e)),
    }
}

fn create_symlink(target: &str, path: &Path) -> Result<()> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, path);

    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_file(target, path);

    #[cfg(not(any(unix, windows)))]
    let result: io::Result<()> = {
        let _ = target;
        Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported"))
    };

    result.map_err(|e| apply_error(path, e))
}

//! Deterministic traversal of a folder into a [`Manifest`].
//!
//! Symlinks are recorded as leaf entries and never followed, so traversal
//! cannot cycle. FIFOs, sockets and device nodes are recorded without
//! content so a reset can clear ones that appeared later. File contents are hashed in parallel on the current rayon
//! pool by streaming them from disk.

use crate::error::{FoamError, Result};
use crate::manifest::{Entry, Manifest};
use crate::utils::hash::hash_files_parallel;
use crate::utils::paths::relative_slash_path;
use crate::utils::permissions::FilePermissions;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, span};
use walkdir::WalkDir;

/// Builds manifests of live folders
#[derive(Debug, Clone, Default)]
pub struct TreeWalker {
    /// Subtrees never captured (the store itself, when it lives inside a tracked folder)
    excluded: Vec<PathBuf>,
}

impl TreeWalker {
    /// Walker with nothing excluded
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `path` and everything below it
    #[must_use]
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| path.starts_with(excluded))
    }

    /// Capture the tree below `root`, excluding `root` itself.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `root` is missing or not a directory, and
    /// `Access` if any entry cannot be stat'ed, read or named in UTF-8.
    /// The walk stops at the first such failure.
    pub fn walk(&self, root: &Path) -> Result<Manifest> {
        let span = span!(Level::DEBUG, "walk", root = %root.display());
        let _enter = span.enter();

        let metadata = fs::metadata(root).map_err(|e| FoamError::from_io(root, e))?;
        if !metadata.is_dir() {
            return Err(FoamError::not_found(root, "not a directory"));
        }

        let mut entries = Vec::new();
        let mut files: Vec<(String, u32)> = Vec::new();
        let mut file_paths = Vec::new();

        for item in WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()))
        {
            let item = item.map_err(|err| {
                let path = err.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                FoamError::access(path, source)
            })?;

            let path = item.path();
            let relative = relative_slash_path(root, path)?;
            let file_type = item.file_type();

            if file_type.is_symlink() {
                let target = fs::read_link(path).map_err(|e| FoamError::access(path, e))?;
                let target = target.to_str().ok_or_else(|| {
                    FoamError::access(
                        path,
                        io::Error::new(io::ErrorKind::InvalidData, "link target is not valid UTF-8"),
                    )
                })?;
                entries.push(Entry::symlink(relative, target));
                continue;
            }

            let metadata = item
                .metadata()
                .map_err(|e| FoamError::access(path, io::Error::other(e)))?;
            let mode = FilePermissions::from_metadata(&metadata).mode();

            if file_type.is_dir() {
                entries.push(Entry::directory(relative, mode));
            } else if file_type.is_file() {
                files.push((relative, mode));
                file_paths.push(path.to_path_buf());
            } else {
                debug!(path = %path.display(), "recording special file");
                entries.push(Entry::special(relative, mode));
            }
        }

        let hashes = hash_files_parallel(&file_paths)?;
        entries.extend(
            files
                .into_iter()
                .zip(hashes)
                .map(|((relative, mode), (hash, size))| Entry::file(relative, mode, size, hash)),
        );

        debug!(entries = entries.len(), files = file_paths.len(), "walk complete");
        Manifest::new(root.to_path_buf(), Utc::now(), entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::manifest::EntryKind;
    use crate::utils::hash::hash_bytes;
    use tempfile::TempDir;

    fn sample_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("sub").join("deep")).unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("sub").join("b.txt"), "world").unwrap();
        fs::write(root.join("sub").join("deep").join("c.txt"), "").unwrap();
        temp
    }

    #[test]
    fn test_walk_records_every_entry() -> Result<()> {
        let temp = sample_tree();
        let manifest = TreeWalker::new().walk(temp.path())?;

        let paths: Vec<&str> = manifest.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["a.txt", "empty", "sub", "sub/b.txt", "sub/deep", "sub/deep/c.txt"]
        );

        let a = manifest.get("a.txt").unwrap();
        assert_eq!(a.kind, EntryKind::File);
        assert_eq!(a.size, 5);
        assert_eq!(a.content_hash, Some(hash_bytes(b"hello")));
        assert_eq!(manifest.get("empty").unwrap().kind, EntryKind::Directory);
        Ok(())
    }

    #[test]
    fn test_walk_is_deterministic() -> Result<()> {
        let temp = sample_tree();
        let walker = TreeWalker::new();
        let first = walker.walk(temp.path())?;
        let second = walker.walk(temp.path())?;
        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.tree_digest()?, second.tree_digest()?);
        Ok(())
    }

    #[test]
    fn test_walk_missing_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = TreeWalker::new().walk(&temp.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_walk_file_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();
        let err = TreeWalker::new().walk(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_excluded_subtree_is_skipped() -> Result<()> {
        let temp = sample_tree();
        let manifest = TreeWalker::new()
            .exclude(temp.path().join("sub"))
            .walk(temp.path())?;
        assert!(manifest.get("sub").is_none());
        assert!(manifest.get("sub/b.txt").is_none());
        assert!(manifest.get("a.txt").is_some());
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_are_not_followed() -> Result<()> {
        let temp = sample_tree();
        std::os::unix::fs::symlink("sub", temp.path().join("loop")).unwrap();
        std::os::unix::fs::symlink("nowhere", temp.path().join("dangling")).unwrap();

        let manifest = TreeWalker::new().walk(temp.path())?;
        let link = manifest.get("loop").unwrap();
        assert_eq!(link.kind, EntryKind::Symlink);
        assert_eq!(link.link_target.as_deref(), Some("sub"));
        assert_eq!(link.mode, 0);
        assert!(manifest.get("loop/b.txt").is_none());
        assert_eq!(
            manifest.get("dangling").unwrap().link_target.as_deref(),
            Some("nowhere")
        );
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_socket_is_recorded_as_special() -> Result<()> {
        use std::os::unix::net::UnixListener;
        let temp = sample_tree();
        let _listener = UnixListener::bind(temp.path().join("sub").join("sock")).unwrap();

        let manifest = TreeWalker::new().walk(temp.path())?;
        let sock = manifest.get("sub/sock").unwrap();
        assert_eq!(sock.kind, EntryKind::Special);
        assert_eq!(sock.content_hash, None);
        assert_eq!(sock.size, 0);
        Ok(())
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_non_utf8_name_aborts_walk() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let temp = sample_tree();
        fs::write(temp.path().join(OsStr::from_bytes(b"bad\xff")), "x").unwrap();

        let err = TreeWalker::new().walk(temp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Access);
    }

    #[test]
    #[cfg(unix)]
    fn test_modes_are_recorded() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp = sample_tree();
        fs::set_permissions(temp.path().join("a.txt"), fs::Permissions::from_mode(0o600)).unwrap();

        let manifest = TreeWalker::new().walk(temp.path())?;
        assert_eq!(manifest.get("a.txt").unwrap().mode, 0o600);
        Ok(())
    }
}

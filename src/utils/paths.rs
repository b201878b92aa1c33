use crate::error::{FoamError, Result};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to the identity foam uses for a folder: the canonical
/// absolute path of an existing directory.
///
/// `./a` and `/abs/a` for the same directory resolve to the same identity.
///
/// # Errors
///
/// Returns `NotFound` if the path does not exist or is not a directory
pub fn canonical_folder(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|e| FoamError::from_io(path, e))?;
    if !canonical.is_dir() {
        return Err(FoamError::not_found(&canonical, "not a directory"));
    }
    Ok(canonical)
}

/// Resolve `path` to a registry key even when it no longer exists on disk.
///
/// Existing paths are canonicalized. Missing ones are made absolute and
/// normalized lexically, with the longest existing ancestor canonicalized so
/// symlinked parents still agree with what was recorded at track time.
///
/// # Errors
///
/// Returns an `Access` error if the current directory cannot be determined
pub fn lookup_identity(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let absolute = normalize_lexically(&make_absolute(path)?);
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            missing.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            resolved.extend(missing.iter().rev());
            return Ok(resolved);
        }
    }
    Ok(absolute)
}

/// Makes a path absolute, resolving relative paths from current directory
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined
pub fn make_absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let current_dir = std::env::current_dir().map_err(|e| FoamError::access(".", e))?;
        Ok(current_dir.join(path))
    }
}

/// Remove `.` components and fold `..` into their parent without touching the filesystem
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Express `path` relative to `root` as a `/`-separated string.
///
/// # Errors
///
/// Returns an `Access` error if `path` is not under `root` or contains a
/// component that is not valid UTF-8
pub fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        FoamError::access(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path escapes the tracked folder"),
        )
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        let Component::Normal(name) = component else {
            return Err(FoamError::access(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "unexpected path component"),
            ));
        };
        let name = name.to_str().ok_or_else(|| {
            FoamError::access(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
            )
        })?;
        parts.push(name);
    }

    if parts.is_empty() {
        return Err(FoamError::access(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path is the tracked folder itself"),
        ));
    }
    Ok(parts.join("/"))
}

/// Join a `/`-separated relative path onto `root` using native separators
#[must_use]
pub fn resolve_relative(root: &Path, relative: &str) -> PathBuf {
    let mut resolved = root.to_path_buf();
    resolved.extend(relative.split('/'));
    resolved
}

/// Number of components in a `/`-separated relative path
#[must_use]
pub fn depth(relative: &str) -> usize {
    relative.split('/').count()
}

/// Parent of a `/`-separated relative path, `None` for top-level entries
#[must_use]
pub fn parent_of(relative: &str) -> Option<&str> {
    relative.rsplit_once('/').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_slash_path() -> Result<()> {
        let root = Path::new("/work/folder");
        let nested = root.join("a").join("b.txt");
        assert_eq!(relative_slash_path(root, &nested)?, "a/b.txt");
        assert!(relative_slash_path(root, root).is_err());
        assert!(relative_slash_path(root, Path::new("/elsewhere/x")).is_err());
        Ok(())
    }

    #[test]
    fn test_resolve_and_depth() {
        let root = Path::new("/work");
        assert_eq!(
            resolve_relative(root, "a/b/c.txt"),
            Path::new("/work").join("a").join("b").join("c.txt")
        );
        assert_eq!(depth("a"), 1);
        assert_eq!(depth("a/b/c"), 3);
        assert_eq!(parent_of("a/b/c"), Some("a/b"));
        assert_eq!(parent_of("a"), None);
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }

    #[test]
    fn test_canonical_folder_variants_agree() -> Result<()> {
        let dir = tempdir().map_err(|e| FoamError::access("tempdir", e))?;
        let folder = dir.path().join("a");
        std::fs::create_dir(&folder).map_err(|e| FoamError::access(&folder, e))?;

        let direct = canonical_folder(&folder)?;
        let dotted = canonical_folder(&dir.path().join(".").join("a").join("..").join("a"))?;
        assert_eq!(direct, dotted);
        Ok(())
    }

    #[test]
    fn test_canonical_folder_rejects_files_and_missing() -> Result<()> {
        let dir = tempdir().map_err(|e| FoamError::access("tempdir", e))?;
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").map_err(|e| FoamError::access(&file, e))?;

        let not_dir = canonical_folder(&file).unwrap_err();
        assert_eq!(not_dir.kind(), crate::error::ErrorKind::NotFound);
        let missing = canonical_folder(&dir.path().join("missing")).unwrap_err();
        assert_eq!(missing.kind(), crate::error::ErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn test_lookup_identity_for_deleted_folder() -> Result<()> {
        let dir = tempdir().map_err(|e| FoamError::access("tempdir", e))?;
        let folder = dir.path().join("gone");
        std::fs::create_dir(&folder).map_err(|e| FoamError::access(&folder, e))?;
        let identity = canonical_folder(&folder)?;
        std::fs::remove_dir(&folder).map_err(|e| FoamError::access(&folder, e))?;

        assert_eq!(lookup_identity(&folder)?, identity);
        Ok(())
    }
}

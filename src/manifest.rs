//! Captured tree descriptions and their on-disk persistence.
//!
//! A [`Manifest`] lists every filesystem object below a tracked folder,
//! sorted by its `/`-separated relative path. Manifests are immutable once
//! captured. [`ManifestStore`] keeps them under `manifests/`, named by the
//! SHA-256 of their serialized bytes so a damaged file is detected on load.

use crate::error::{FoamError, Result};
use crate::utils::compress::{compress_bytes, decompress_bytes};
use crate::utils::hash::{ContentHash, hash_bytes};
use crate::utils::{atomic_write, paths, serialization};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Type of a filesystem object recorded in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link, never followed
    Symlink,
    /// FIFO, socket or device node. Removed by a reset but never created.
    Special,
}

impl EntryKind {
    /// Lowercase name used in messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Special => "special file",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem object inside a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the tracked folder, `/`-separated
    pub path: String,
    /// What kind of object this is
    pub kind: EntryKind,
    /// Normalized permission bits, zero for symlinks
    pub mode: u32,
    /// Size in bytes, zero for anything but files
    pub size: u64,
    /// Hash of the file contents, files only
    pub content_hash: Option<ContentHash>,
    /// Raw link target, symlinks only
    pub link_target: Option<String>,
}

impl Entry {
    /// Describe a regular file
    #[must_use]
    pub fn file(path: impl Into<String>, mode: u32, size: u64, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            mode,
            size,
            content_hash: Some(hash),
            link_target: None,
        }
    }

    /// Describe a directory
    #[must_use]
    pub fn directory(path: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            mode,
            size: 0,
            content_hash: None,
            link_target: None,
        }
    }

    /// Describe a symbolic link
    #[must_use]
    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Symlink,
            mode: 0,
            size: 0,
            content_hash: None,
            link_target: Some(target.into()),
        }
    }

    /// Describe a FIFO, socket or device node
    #[must_use]
    pub fn special(path: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Special,
            mode,
            size: 0,
            content_hash: None,
            link_target: None,
        }
    }

    /// Whether `other` holds the same object apart from its permission bits
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.content_hash == other.content_hash
            && self.link_target == other.link_target
    }

    fn check_shape(&self) -> std::result::Result<(), String> {
        if self.path.is_empty()
            || self
                .path
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(format!("invalid entry path {:?}", self.path));
        }
        let shaped = match self.kind {
            EntryKind::File => self.content_hash.is_some() && self.link_target.is_none(),
            EntryKind::Directory | EntryKind::Special => {
                self.content_hash.is_none() && self.link_target.is_none()
            }
            EntryKind::Symlink => self.content_hash.is_none() && self.link_target.is_some(),
        };
        if shaped {
            Ok(())
        } else {
            Err(format!("{} entry {:?} has mismatched fields", self.kind, self.path))
        }
    }
}

/// Ordered description of a tree at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    root: PathBuf,
    captured_at: DateTime<Utc>,
    entries: Vec<Entry>,
}

impl Manifest {
    /// Build a manifest, sorting `entries` by path.
    ///
    /// # Errors
    ///
    /// Returns a `Corruption` error if paths repeat, are malformed, or a
    /// file or symlink has no directory entry for its parent
    pub fn new(root: PathBuf, captured_at: DateTime<Utc>, mut entries: Vec<Entry>) -> Result<Self> {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let manifest = Self {
            root,
            captured_at,
            entries,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the structural invariants of a manifest
    ///
    /// # Errors
    ///
    /// Returns a `Corruption` error describing the first violation
    pub fn validate(&self) -> Result<()> {
        let what = format!("manifest of {}", self.root.display());
        for (index, entry) in self.entries.iter().enumerate() {
            entry
                .check_shape()
                .map_err(|detail| FoamError::corruption(&what, detail))?;

            if index > 0 && self.entries[index - 1].path >= entry.path {
                return Err(FoamError::corruption(
                    &what,
                    format!("entry {:?} is duplicated or out of order", entry.path),
                ));
            }

            if let Some(parent) = paths::parent_of(&entry.path)
                && self.get(parent).is_none_or(|p| p.kind != EntryKind::Directory)
            {
                return Err(FoamError::corruption(
                    &what,
                    format!("entry {:?} has no parent directory entry", entry.path),
                ));
            }
        }
        Ok(())
    }

    /// Absolute folder identity the manifest was captured from
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// When the capture happened
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Entries in path order
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the captured folder was empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by relative path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Every blob the manifest references
    #[must_use]
    pub fn content_hashes(&self) -> BTreeSet<ContentHash> {
        self.entries.iter().filter_map(|e| e.content_hash).collect()
    }

    /// Sum of file sizes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Digest of the entries alone. Two captures of an unchanged tree agree
    /// on it even though their timestamps differ.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries cannot be serialized
    pub fn tree_digest(&self) -> Result<ContentHash> {
        let bytes = serialization::serialize("manifest entries", &self.entries)?;
        Ok(hash_bytes(&bytes))
    }
}

/// Reference to a stored manifest: the SHA-256 of its serialized form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestId(ContentHash);

impl ManifestId {
    /// Underlying digest
    #[must_use]
    pub const fn hash(&self) -> ContentHash {
        self.0
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ManifestId {
    type Err = FoamError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse().map(Self)
    }
}

/// Manifest persistence under `manifests/`
pub struct ManifestStore {
    dir: PathBuf,
    compression_level: i32,
}

impl ManifestStore {
    /// Open the store rooted at `dir`; the directory is created lazily
    #[must_use]
    pub const fn new(dir: PathBuf, compression_level: i32) -> Self {
        Self {
            dir,
            compression_level,
        }
    }

    fn path_for(&self, id: &ManifestId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Persist `manifest` and return its reference. Saving identical bytes
    /// twice reuses the existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn save(&self, manifest: &Manifest) -> Result<ManifestId> {
        let bytes = serialization::serialize("manifest", manifest)?;
        let id = ManifestId(hash_bytes(&bytes));
        let path = self.path_for(&id);
        if path.is_file() {
            debug!(%id, "manifest already stored");
            return Ok(id);
        }

        let compressed = compress_bytes("manifest", &bytes, self.compression_level)?;
        atomic_write(&path, &compressed)?;
        debug!(%id, entries = manifest.len(), "stored manifest");
        Ok(id)
    }

    /// Load and verify a manifest.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such manifest is stored and `Corruption` if
    /// its bytes no longer match the reference or violate manifest invariants
    pub fn load(&self, id: &ManifestId) -> Result<Manifest> {
        let path = self.path_for(id);
        let compressed = fs::read(&path).map_err(|e| FoamError::from_io(&path, e))?;
        let what = format!("manifest {id}");
        let bytes = decompress_bytes(&what, &compressed)?;

        let actual = hash_bytes(&bytes);
        if actual != id.0 {
            return Err(FoamError::corruption(what, format!("content hashes to {actual}")));
        }

        let manifest: Manifest = serialization::deserialize(&what, &bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Every stored manifest reference
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if the directory cannot be read
    pub fn list(&self) -> Result<Vec<ManifestId>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FoamError::access(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FoamError::access(&self.dir, e))?;
            // Temporary files from interrupted writes do not parse
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ManifestId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete a stored manifest. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if removal fails
    pub fn remove(&self, id: &ManifestId) -> Result<bool> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FoamError::access(path, e)),
        }
    }
}

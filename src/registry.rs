//! Tracking registry: which manifest is current for each tracked folder.
//!
//! The registry is a single bincode file replaced atomically on every change.
//! Writers hold an exclusive lock on `registry.lock` for the whole
//! read-modify-write cycle; readers hold it shared, so a reader never sees a
//! half-applied change from another thread or process.

use crate::error::{FoamError, Result};
use crate::manifest::ManifestId;
use crate::utils::{atomic_write, serialization};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// File name of the registry inside the store directory
pub const REGISTRY_FILE: &str = "registry.bin";

/// File name of the registry's cross-process lock
pub const REGISTRY_LOCK_FILE: &str = "registry.lock";

/// Pointer from a folder identity to its retained manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFolder {
    /// Canonical absolute path of the folder
    pub folder: PathBuf,
    /// Manifest captured by the most recent `track`
    pub manifest: ManifestId,
    /// When that capture happened
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    /// Format version for future compatibility
    version: u32,
    folders: BTreeMap<PathBuf, TrackedFolder>,
}

impl RegistryFile {
    /// Current registry format version
    const CURRENT_VERSION: u32 = 1;

    const fn empty() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            folders: BTreeMap::new(),
        }
    }
}

/// Persistent folder → manifest mapping
pub struct Registry {
    dir: PathBuf,
    /// Serializes threads of this process; the lock file covers other processes
    guard: RwLock<()>,
}

impl Registry {
    /// Open the registry stored in `dir`; files are created on first write
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            guard: RwLock::new(()),
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    fn lock_file(&self) -> Result<File> {
        fs::create_dir_all(&self.dir).map_err(|e| FoamError::access(&self.dir, e))?;
        let path = self.dir.join(REGISTRY_LOCK_FILE);
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| FoamError::access(&path, e))
    }

    fn load(&self) -> Result<RegistryFile> {
        let path = self.registry_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RegistryFile::empty()),
            Err(e) => return Err(FoamError::access(&path, e)),
        };
        let file: RegistryFile = serialization::deserialize("registry", &bytes)?;
        if file.version != RegistryFile::CURRENT_VERSION {
            return Err(FoamError::corruption(
                "registry",
                format!("unsupported format version {}", file.version),
            ));
        }
        Ok(file)
    }

    /// Run `f` over the registry contents while writers are excluded
    ///
    /// # Errors
    ///
    /// Returns the registry's load error or whatever `f` returns
    pub fn read_locked<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&BTreeMap<PathBuf, TrackedFolder>) -> Result<T>,
    {
        let _guard = self.guard.read().unwrap_or_else(PoisonError::into_inner);
        let lock = self.lock_file()?;
        fs4::fs_std::FileExt::lock_shared(&lock)
            .map_err(|e| FoamError::access(self.dir.join(REGISTRY_LOCK_FILE), e))?;
        let result = self.load().and_then(|file| f(&file.folders));
        let _ = fs4::fs_std::FileExt::unlock(&lock);
        result
    }

    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BTreeMap<PathBuf, TrackedFolder>) -> T,
    {
        let _guard = self.guard.write().unwrap_or_else(PoisonError::into_inner);
        let lock = self.lock_file()?;
        fs4::fs_std::FileExt::lock_exclusive(&lock)
            .map_err(|e| FoamError::access(self.dir.join(REGISTRY_LOCK_FILE), e))?;

        let result = self.load().and_then(|mut file| {
            let value = f(&mut file.folders);
            let bytes = serialization::serialize("registry", &file)?;
            atomic_write(&self.registry_path(), &bytes)?;
            Ok(value)
        });
        let _ = fs4::fs_std::FileExt::unlock(&lock);
        result
    }

    /// Record for `folder`, if tracked
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the registry cannot be decoded
    pub fn get(&self, folder: &Path) -> Result<Option<TrackedFolder>> {
        self.read_locked(|folders| Ok(folders.get(folder).cloned()))
    }

    /// Insert or replace the record for `record.folder`. Returns the record it replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or written
    pub fn put(&self, record: TrackedFolder) -> Result<Option<TrackedFolder>> {
        debug!(folder = %record.folder.display(), manifest = %record.manifest, "registering");
        self.modify(|folders| folders.insert(record.folder.clone(), record))
    }

    /// Forget `folder`. Returns the removed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or written
    pub fn remove(&self, folder: &Path) -> Result<Option<TrackedFolder>> {
        self.modify(|folders| folders.remove(folder))
    }

    /// Forget every folder. Returns the removed records in folder order.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or written
    pub fn clear_all(&self) -> Result<Vec<TrackedFolder>> {
        self.modify(|folders| std::mem::take(folders).into_values().collect())
    }

    /// Every record, ordered by folder identity
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the registry cannot be decoded
    pub fn list(&self) -> Result<Vec<TrackedFolder>> {
        self.read_locked(|folders| Ok(folders.values().cloned().collect()))
    }
}

//! The public operations: track, list, undo, reset, status and gc.
//!
//! [`Foam`] wires the store, walker, diff engine, restore executor and
//! registry together. Multi-folder operations run each folder on the worker
//! pool and report one outcome per folder, so a failure on one folder never
//! stops the others.
//!
//! Ordering discipline per folder:
//!
//! - `track`: folder lock, shared store lock, walk, ingest blobs, save the
//!   manifest, publish it in the registry, release the store lock, then try
//!   an opportunistic collection.
//! - `reset`: folder lock, shared store lock, load the stored manifest, walk
//!   the live tree, diff, apply.
//! - collection: exclusive store lock, then a registry read lock while the
//!   live set is computed and everything else is deleted.

use crate::diff::{EditScript, diff};
use crate::error::{FoamError, Result};
use crate::lock::{FolderLock, StoreLock};
use crate::manifest::{EntryKind, ManifestId, ManifestStore};
use crate::registry::{Registry, TrackedFolder};
use crate::restore::{ApplyReport, RestoreExecutor, RestoreOptions};
use crate::store::ContentStore;
use crate::utils::hash::{ContentHash, Deduplicator};
use crate::utils::paths::{canonical_folder, lookup_identity, resolve_relative};
use crate::utils::thread_pool;
use crate::walker::TreeWalker;
use crate::{FoamContext, LOCKS_DIR, MANIFESTS_DIR, OBJECTS_DIR};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, info, span, warn};

/// One outcome per folder, keyed by folder identity
pub type FolderResults<T> = BTreeMap<PathBuf, Result<T>>;

/// What tracking one folder did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    /// Manifest now registered for the folder
    pub manifest: ManifestId,
    /// Entries captured
    pub entries: usize,
    /// Total size of captured files
    pub bytes: u64,
    /// Blobs that were not in the store before
    pub new_blobs: usize,
    /// Whether an earlier capture was replaced
    pub replaced: bool,
}

/// A tracked folder as shown by `list_tracked`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInfo {
    /// Folder identity
    pub folder: PathBuf,
    /// When the retained capture happened
    pub captured_at: DateTime<Utc>,
    /// Retained manifest
    pub manifest: ManifestId,
    /// Entries in the retained manifest
    pub entries: usize,
    /// Total size of captured files
    pub bytes: u64,
}

/// What garbage collection released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Blobs deleted
    pub blobs_removed: usize,
    /// Manifests deleted
    pub manifests_removed: usize,
}

/// What `undo` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoSummary {
    /// Folders that were tracked before the call
    pub cleared: Vec<PathBuf>,
    /// Storage released afterwards
    pub gc: GcReport,
}

/// Snapshot engine bound to one store directory
pub struct Foam {
    store_path: PathBuf,
    content: ContentStore,
    manifests: ManifestStore,
    registry: Registry,
    walker: TreeWalker,
    restore_options: RestoreOptions,
    lock_timeout: Duration,
    pool: Arc<rayon::ThreadPool>,
}

impl Foam {
    /// Open (creating if needed) the store described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if the store directory cannot be created or
    /// the worker pool cannot be started
    pub fn open(ctx: &FoamContext) -> Result<Self> {
        fs::create_dir_all(&ctx.store_path).map_err(|e| FoamError::access(&ctx.store_path, e))?;
        let store_path = ctx
            .store_path
            .canonicalize()
            .map_err(|e| FoamError::access(&ctx.store_path, e))?;
        let config = &ctx.config;

        Ok(Self {
            content: ContentStore::new(store_path.join(OBJECTS_DIR), config.core.compression_level),
            manifests: ManifestStore::new(
                store_path.join(MANIFESTS_DIR),
                config.core.compression_level,
            ),
            registry: Registry::new(store_path.clone()),
            walker: TreeWalker::new().exclude(store_path.clone()),
            restore_options: RestoreOptions {
                preserve_permissions: config.restore.preserve_permissions,
                fsync: config.restore.fsync,
            },
            lock_timeout: config.performance.lock_timeout(),
            pool: thread_pool::pool_for(config.performance.parallel_threads)?,
            store_path,
        })
    }

    /// Canonical store directory
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// The blob store, for inspection
    #[must_use]
    pub const fn content_store(&self) -> &ContentStore {
        &self.content
    }

    fn locks_dir(&self) -> PathBuf {
        self.store_path.join(LOCKS_DIR)
    }

    /// Run `op` for every identity on the worker pool
    fn for_each_folder<T, F>(&self, identities: BTreeMap<PathBuf, Result<()>>, op: F) -> FolderResults<T>
    where
        T: Send,
        F: Fn(&Path) -> Result<T> + Sync,
    {
        self.pool.install(|| {
            identities
                .into_par_iter()
                .map(|(identity, resolved)| {
                    let outcome = resolved.and_then(|()| op(&identity));
                    (identity, outcome)
                })
                .collect()
        })
    }

    /// Capture each folder and make it the retained state for that folder,
    /// replacing any earlier capture.
    ///
    /// Paths naming the same directory are tracked once.
    pub fn track<P: AsRef<Path>>(&self, folders: &[P]) -> FolderResults<TrackSummary> {
        let identities = folders
            .iter()
            .map(|folder| {
                let folder = folder.as_ref();
                match canonical_folder(folder) {
                    Ok(identity) => (identity, Ok(())),
                    Err(e) => (lookup_identity(folder).unwrap_or_else(|_| folder.to_path_buf()), Err(e)),
                }
            })
            .collect();
        self.for_each_folder(identities, |identity| self.track_folder(identity))
    }

    fn track_folder(&self, identity: &Path) -> Result<TrackSummary> {
        let span = span!(Level::DEBUG, "track", folder = %identity.display());
        let _enter = span.enter();

        let _folder_lock = FolderLock::acquire(&self.locks_dir(), identity, self.lock_timeout)?;
        let store_lock = StoreLock::shared(&self.locks_dir(), self.lock_timeout)?;

        let manifest = self.walker.walk(identity)?;

        let claimed = Deduplicator::new();
        let files: Vec<(PathBuf, ContentHash)> = manifest
            .entries()
            .iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .filter_map(|entry| entry.content_hash.map(|hash| (entry, hash)))
            .filter(|(_, hash)| claimed.claim(*hash))
            .map(|(entry, hash)| (resolve_relative(identity, &entry.path), hash))
            .collect();
        let stored = files
            .par_iter()
            .map(|(path, hash)| self.content.ingest_file(path, hash))
            .collect::<Result<Vec<bool>>>()?;
        let new_blobs = stored.into_iter().filter(|written| *written).count();

        let id = self.manifests.save(&manifest)?;
        let previous = self.registry.put(TrackedFolder {
            folder: identity.to_path_buf(),
            manifest: id,
            captured_at: manifest.captured_at(),
        })?;
        drop(store_lock);

        info!(
            entries = manifest.len(),
            distinct_blobs = claimed.len(),
            new_blobs,
            "tracked"
        );

        if previous.as_ref().is_some_and(|old| old.manifest != id) {
            match self.try_collect_garbage() {
                Ok(Some(report)) => debug!(?report, "released superseded capture"),
                Ok(None) => debug!("store busy, leaving collection for later"),
                Err(e) => warn!(error = %e, "garbage collection after track failed"),
            }
        }

        Ok(TrackSummary {
            manifest: id,
            entries: manifest.len(),
            bytes: manifest.total_size(),
            new_blobs,
            replaced: previous.is_some(),
        })
    }

    /// Every tracked folder with its retained capture, ordered by identity
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or a retained manifest cannot be read
    pub fn list_tracked(&self) -> Result<Vec<TrackedInfo>> {
        self.registry
            .list()?
            .into_iter()
            .map(|record| {
                let manifest = self.manifests.load(&record.manifest)?;
                Ok(TrackedInfo {
                    folder: record.folder,
                    captured_at: record.captured_at,
                    manifest: record.manifest,
                    entries: manifest.len(),
                    bytes: manifest.total_size(),
                })
            })
            .collect()
    }

    /// Forget every tracked folder and release the storage they held.
    /// Live folder contents are never touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be cleared or collection fails
    pub fn undo(&self) -> Result<UndoSummary> {
        let span = span!(Level::DEBUG, "undo");
        let _enter = span.enter();

        let cleared = self
            .registry
            .clear_all()?
            .into_iter()
            .map(|record| record.folder)
            .collect();
        let gc = self.gc()?;
        Ok(UndoSummary { cleared, gc })
    }

    /// Restore each named folder to its retained capture.
    ///
    /// A folder that is not tracked, or whose directory no longer exists, is
    /// reported as not found and left untouched.
    pub fn reset<P: AsRef<Path>>(&self, folders: &[P]) -> FolderResults<ApplyReport> {
        let identities = folders
            .iter()
            .map(|folder| {
                let folder = folder.as_ref();
                match lookup_identity(folder) {
                    Ok(identity) => (identity, Ok(())),
                    Err(e) => (folder.to_path_buf(), Err(e)),
                }
            })
            .collect();
        self.for_each_folder(identities, |identity| self.reset_folder(identity))
    }

    /// Restore every tracked folder to its retained capture.
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry cannot be read; per-folder
    /// failures are in the returned map
    pub fn reset_all(&self) -> Result<FolderResults<ApplyReport>> {
        let identities = self
            .registry
            .list()?
            .into_iter()
            .map(|record| (record.folder, Ok(())))
            .collect();
        Ok(self.for_each_folder(identities, |identity| self.reset_folder(identity)))
    }

    fn tracked_record(&self, identity: &Path) -> Result<TrackedFolder> {
        self.registry
            .get(identity)?
            .ok_or_else(|| FoamError::not_found(identity, "folder is not tracked"))
    }

    fn ensure_folder_present(identity: &Path) -> Result<()> {
        match fs::metadata(identity) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(FoamError::not_found(identity, "tracked folder is no longer a directory")),
            Err(e) => Err(FoamError::from_io(identity, e)),
        }
    }

    fn reset_folder(&self, identity: &Path) -> Result<ApplyReport> {
        let span = span!(Level::DEBUG, "reset", folder = %identity.display());
        let _enter = span.enter();

        let _folder_lock = FolderLock::acquire(&self.locks_dir(), identity, self.lock_timeout)?;
        let record = self.tracked_record(identity)?;
        Self::ensure_folder_present(identity)?;
        let _store_lock = StoreLock::shared(&self.locks_dir(), self.lock_timeout)?;

        let stored = self.manifests.load(&record.manifest)?;
        let live = self.walker.walk(identity)?;
        let script = diff(&live, &stored);
        if script.is_empty() {
            debug!("already matches the retained capture");
            return Ok(ApplyReport::default());
        }

        let report = RestoreExecutor::new(&self.content, self.restore_options).apply(identity, &script)?;
        info!(applied = report.applied, "reset");
        Ok(report)
    }

    /// Edit script a reset of `folder` would apply, without applying it
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the folder is not tracked or missing, or any
    /// error from loading the capture or walking the live tree
    pub fn status(&self, folder: &Path) -> Result<EditScript> {
        let identity = lookup_identity(folder)?;
        let _folder_lock = FolderLock::acquire(&self.locks_dir(), &identity, self.lock_timeout)?;
        let record = self.tracked_record(&identity)?;
        Self::ensure_folder_present(&identity)?;

        let stored = self.manifests.load(&record.manifest)?;
        let live = self.walker.walk(&identity)?;
        Ok(diff(&live, &stored))
    }

    /// Delete every manifest and blob not reachable from the registry,
    /// waiting for in-flight track and reset operations to finish first
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the store stays busy past the lock timeout,
    /// or any error reading the registry or a retained manifest
    pub fn gc(&self) -> Result<GcReport> {
        let _store_lock = StoreLock::exclusive(&self.locks_dir(), self.lock_timeout)?;
        self.sweep()
    }

    fn try_collect_garbage(&self) -> Result<Option<GcReport>> {
        match StoreLock::try_exclusive(&self.locks_dir())? {
            Some(_store_lock) => self.sweep().map(Some),
            None => Ok(None),
        }
    }

    /// Caller holds the store lock exclusively
    fn sweep(&self) -> Result<GcReport> {
        let span = span!(Level::DEBUG, "gc");
        let _enter = span.enter();

        self.registry.read_locked(|folders| {
            let mut live_manifests = HashSet::new();
            let mut live_blobs = HashSet::new();
            for record in folders.values() {
                // Any unreadable retained manifest aborts collection so its blobs survive
                let manifest = self.manifests.load(&record.manifest)?;
                live_blobs.extend(manifest.content_hashes());
                live_manifests.insert(record.manifest);
            }

            let mut manifests_removed = 0;
            for id in self.manifests.list()? {
                if !live_manifests.contains(&id) && self.manifests.remove(&id)? {
                    manifests_removed += 1;
                }
            }
            let blobs_removed = self.content.release_unreferenced(&live_blobs)?;

            debug!(manifests_removed, blobs_removed, "collection complete");
            Ok(GcReport {
                blobs_removed,
                manifests_removed,
            })
        })
    }
}

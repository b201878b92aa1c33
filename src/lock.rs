//! Cross-process locks guarding folder operations and garbage collection
//!
//! A [`FolderLock`] serializes `track`, `reset` and status checks on one
//! folder identity. A [`StoreLock`] is held shared by anything that ingests
//! blobs or publishes manifests and exclusively by garbage collection, so a
//! blob written but not yet referenced is never collected. Locks are released
//! when dropped; lock files stay in place to be reused.

use crate::error::{FoamError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_128;

/// File name of the store-wide lock inside the locks directory
pub const STORE_LOCK_FILE: &str = "store.lock";

fn retry_interval() -> Duration {
    // Use shorter intervals in test mode for faster test execution
    if cfg!(test) {
        Duration::from_millis(10)
    } else {
        Duration::from_millis(100)
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| FoamError::access(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)
        .map_err(|e| FoamError::access(lock_path, e))
}

/// Retry `attempt` until it reports success or `timeout` elapses
fn acquire_with_retry<F>(lock_path: &Path, timeout: Duration, what: &str, attempt: F) -> Result<File>
where
    F: Fn(&File) -> std::io::Result<bool>,
{
    let file = open_lock_file(lock_path)?;
    let start = Instant::now();

    loop {
        match attempt(&file) {
            Ok(true) => return Ok(file),
            Ok(false) if start.elapsed() < timeout => std::thread::sleep(retry_interval()),
            Ok(false) => {
                return Err(FoamError::conflict(
                    lock_path,
                    format!(
                        "{what} is busy; gave up after {}",
                        humantime::format_duration(timeout)
                    ),
                ));
            }
            Err(e) => return Err(FoamError::access(lock_path, e)),
        }
    }
}

/// Lock file name for a folder identity
#[must_use]
pub fn folder_lock_name(folder: &Path) -> String {
    format!("{:032x}.lock", xxh3_128(folder.as_os_str().as_encoded_bytes()))
}

/// Exclusive lock on one folder identity
///
/// The lock is automatically released when this struct is dropped.
pub struct FolderLock {
    /// Lock file handle
    lock_file: File,
    /// Path to the lock file (for error messages)
    lock_path: PathBuf,
}

impl FolderLock {
    /// Acquire the lock for `folder`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a `Conflict` error if another operation on the folder still
    /// holds the lock when the timeout expires, or an `Access` error if the
    /// lock file cannot be created
    pub fn acquire(locks_dir: &Path, folder: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = locks_dir.join(folder_lock_name(folder));
        let what = format!("folder {}", folder.display());
        let lock_file = acquire_with_retry(&lock_path, timeout, &what, |file| {
            fs4::fs_std::FileExt::try_lock_exclusive(file)
        })?;

        // Write owner info for debugging
        let mut file_ref = &lock_file;
        let _ = file_ref.set_len(0);
        let _ = writeln!(
            file_ref,
            "folder={}\npid={}\ntime={}",
            folder.display(),
            std::process::id(),
            humantime::format_rfc3339(SystemTime::now())
        );

        debug!(folder = %folder.display(), "acquired folder lock");
        Ok(Self {
            lock_file,
            lock_path,
        })
    }

    /// Where the lock file lives
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        let _ = fs4::fs_std::FileExt::unlock(&self.lock_file);
    }
}

/// Store-wide lock: shared while ingesting and publishing, exclusive for GC
pub struct StoreLock {
    lock_file: File,
    exclusive: bool,
}

impl StoreLock {
    /// Take the lock shared, waiting up to `timeout` for a running GC.
    ///
    /// # Errors
    ///
    /// Returns a `Conflict` error on timeout or `Access` if the lock file
    /// cannot be opened
    pub fn shared(locks_dir: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = locks_dir.join(STORE_LOCK_FILE);
        let lock_file = acquire_with_retry(&lock_path, timeout, "content store", |file| {
            fs4::fs_std::FileExt::try_lock_shared(file)
        })?;
        Ok(Self {
            lock_file,
            exclusive: false,
        })
    }

    /// Take the lock exclusively, waiting up to `timeout` for every holder to finish.
    ///
    /// # Errors
    ///
    /// Returns a `Conflict` error on timeout or `Access` if the lock file
    /// cannot be opened
    pub fn exclusive(locks_dir: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = locks_dir.join(STORE_LOCK_FILE);
        let lock_file = acquire_with_retry(&lock_path, timeout, "content store", |file| {
            fs4::fs_std::FileExt::try_lock_exclusive(file)
        })?;
        Ok(Self {
            lock_file,
            exclusive: true,
        })
    }

    /// Take the lock exclusively only if nobody holds it right now
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if the lock file cannot be opened or locked
    pub fn try_exclusive(locks_dir: &Path) -> Result<Option<Self>> {
        let lock_path = locks_dir.join(STORE_LOCK_FILE);
        let lock_file = open_lock_file(&lock_path)?;
        let acquired = fs4::fs_std::FileExt::try_lock_exclusive(&lock_file)
            .map_err(|e| FoamError::access(&lock_path, e))?;
        Ok(acquired.then_some(Self {
            lock_file,
            exclusive: true,
        }))
    }

    /// Whether this holder excludes everyone else
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs4::fs_std::FileExt::unlock(&self.lock_file);
    }
}

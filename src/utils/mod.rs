//! Utility functions and helpers.
//!
//! # Submodules
//!
//! - [`compress`]: Compression helpers
//! - [`hash`]: Content hashing
//! - [`paths`]: Folder identity and relative path handling
//! - [`permissions`]: Cross-platform file permissions
//! - [`serialization`]: Binary serialization
//! - [`thread_pool`]: Thread pool configuration
//!
//! # Examples
//!
//! ```
//! use foam::utils::{expand_tilde, format_size};
//!
//! let path = expand_tilde("~/.foam");
//! assert_eq!(format_size(1024 * 1024), "1.00 MB");
//! ```

/// Compression utilities (Zstandard)
pub mod compress;
/// SHA-256 content hashing
pub mod hash;
/// Path manipulation and resolution utilities
pub mod paths;
/// Unix permission handling
pub mod permissions;
/// Binary serialization utilities
pub mod serialization;
/// Thread pool configuration for parallel operations
pub mod thread_pool;

use crate::error::{FoamError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Expands a path starting with `~` to the user's home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Replace `path` with `bytes` atomically: the data goes to a temporary file
/// in the same directory which is synced and renamed over the target.
///
/// # Errors
///
/// Returns an `Access` error if the temporary file cannot be created,
/// written, synced or renamed
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| FoamError::access(parent, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| FoamError::access(parent, e))?;
    temp.write_all(bytes)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| FoamError::access(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| FoamError::access(path, e.error))?;
    Ok(())
}

/// Formats a file size in bytes into a human-readable string with appropriate units.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size.round() as u64, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

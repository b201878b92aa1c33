use std::fs;
use std::io;
use std::path::Path;

/// Permission bits foam records: rwx for user/group/other plus setuid,
/// setgid and sticky. File type bits are never part of a recorded mode.
pub const MODE_MASK: u32 = 0o7777;

/// Owner write bit
const OWNER_WRITE: u32 = 0o200;

/// Cross-platform file permissions handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePermissions {
    /// Normalized permission bits
    mode: u32,
}

impl FilePermissions {
    /// Create permissions from a raw mode value, dropping file type bits
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        Self {
            mode: mode & MODE_MASK,
        }
    }

    /// Get the raw mode value
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Whether the owner may write (needed to create or remove children of a directory)
    #[must_use]
    pub const fn owner_writable(&self) -> bool {
        self.mode & OWNER_WRITE != 0
    }

    /// Normalize the permissions in `metadata`.
    ///
    /// On Windows only the read-only flag survives, mapped onto the same
    /// octal representation unix uses so manifests compare the same way.
    #[must_use]
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self::from_mode(metadata.mode())
        }

        #[cfg(windows)]
        {
            let base = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
            let dir_bits = if metadata.is_dir() { 0o111 } else { 0 };
            Self::from_mode(base | dir_bits)
        }

        #[cfg(not(any(unix, windows)))]
        {
            if metadata.is_dir() {
                Self::default_directory()
            } else {
                Self::default_file()
            }
        }
    }

    /// Apply these permissions to `path`. Symlinks have no recorded mode,
    /// so callers never pass one here.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from setting permissions
    pub fn apply_to_path(&self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(self.mode))
        }

        #[cfg(windows)]
        {
            let mut permissions = fs::metadata(path)?.permissions();
            permissions.set_readonly(!self.owner_writable());
            fs::set_permissions(path, permissions)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = path;
            Ok(())
        }
    }

    /// Get a platform-appropriate default permission mode
    #[must_use]
    pub const fn default_file() -> Self {
        Self::from_mode(0o644) // rw-r--r--
    }

    /// Get a platform-appropriate default directory permission mode
    #[must_use]
    pub const fn default_directory() -> Self {
        Self::from_mode(0o755) // rwxr-xr-x
    }
}

impl Default for FilePermissions {
    fn default() -> Self {
        Self::default_file()
    }
}

/// Helper to check if the platform supports full permission preservation
#[must_use]
pub const fn supports_full_permissions() -> bool {
    cfg!(unix)
}

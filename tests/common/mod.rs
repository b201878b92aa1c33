#![allow(dead_code)]

use anyhow::Result;
use foam::config::Config;
use foam::{Foam, FoamContext};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary store plus a scratch directory for folders under test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store_dir: PathBuf,
    pub work_dir: PathBuf,
    pub foam: Foam,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store_dir = temp_dir.path().join("store");
        let work_dir = temp_dir.path().join("work");
        fs::create_dir_all(&work_dir)?;
        let work_dir = work_dir.canonicalize()?;

        let ctx = FoamContext::from_config(store_dir.clone(), config);
        let foam = Foam::open(&ctx)?;

        Ok(Self {
            temp_dir,
            store_dir,
            work_dir,
            foam,
        })
    }

    /// Create (or reuse) a folder under the work directory
    pub fn folder(&self, name: &str) -> Result<PathBuf> {
        let path = self.work_dir.join(name);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Number of blobs in the content store
    pub fn blob_count(&self) -> Result<usize> {
        Ok(self.foam.content_store().count()?)
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.performance.parallel_threads = 2;
    config.performance.lock_timeout_secs = 2;
    config.restore.fsync = false;
    config
}

/// Write `content` to `root/rel`, creating parents
pub fn write_file(root: &Path, rel: &str, content: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Relative path, kind and payload of everything under `root`, sorted
pub fn tree_listing(root: &Path) -> Result<Vec<(String, String)>> {
    let mut listing = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(root)?
            .to_string_lossy()
            .replace('\\', "/");
        let file_type = entry.file_type();
        let payload = if file_type.is_symlink() {
            format!("link:{}", fs::read_link(entry.path())?.display())
        } else if file_type.is_dir() {
            "dir".to_string()
        } else {
            format!("file:{}", fs::read_to_string(entry.path())?)
        };
        listing.push((rel, payload));
    }
    Ok(listing)
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::symlink_metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

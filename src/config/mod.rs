pub mod parser;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings read from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    /// How reset writes files back
    #[serde(default)]
    pub restore: RestoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Where blobs, manifests and the registry live
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
    /// How long to wait for another foam process holding a folder or the store
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreConfig {
    #[serde(default = "default_true")]
    pub preserve_permissions: bool,
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            compression_level: default_compression_level(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            fsync: true,
        }
    }
}

impl PerformanceConfig {
    /// Lock wait as a duration
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot read or parse the configuration file
    /// - Configuration file contains invalid TOML or out-of-range values
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            // Create default config if it doesn't exist
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        parser::parse_config_file(path)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        crate::utils::atomic_write(path, toml_str.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

fn default_store_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    home.join(crate::DEFAULT_STORE_DIR)
}

const fn default_compression_level() -> i32 {
    3
}

fn default_parallel_threads() -> usize {
    crate::utils::thread_pool::default_threads()
}

const fn default_lock_timeout_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_default_file() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("foam").join("config.toml");

        let config = Config::load(&path)?;
        assert!(path.exists());
        assert_eq!(config, Config::default());
        assert_eq!(Config::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_lock_timeout_duration() {
        let config = Config::default();
        assert_eq!(config.performance.lock_timeout(), Duration::from_secs(30));
    }
}

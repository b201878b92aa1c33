#![warn(missing_docs)]
// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::arithmetic_side_effects)] // Simple counters and size calculations cannot overflow
#![allow(clippy::indexing_slicing)] // Bounds checked by logic
//! # Foam - Folder State Tracking and Reset
//!
//! Foam records the exact state of folders and later resets them back to it:
//! file contents, directory structure, permission bits and symbolic links,
//! including files created or deleted after tracking began.
//!
//! ## Features
//!
//! - **Content-Addressed Storage**: File contents are hashed with SHA-256 and deduplicated
//! - **Minimal Edit Scripts**: Reset only touches what differs from the captured state
//! - **Atomic Writes**: Files are staged next to their destination and renamed into place
//! - **Parallel Processing**: Uses Rayon for hashing and for independent folders
//! - **Compression**: Zstandard compression with configurable levels
//!
//! ## Architecture
//!
//! - [`walker`]: Deterministic traversal of a folder into a manifest
//! - [`manifest`]: Captured tree descriptions and their persistence
//! - [`store`]: Content-addressable blob storage
//! - [`diff`]: Edit scripts between two manifests
//! - [`restore`]: Applying edit scripts to live folders
//! - [`registry`]: Which capture is current for each tracked folder
//! - [`engine`]: The public operations tying everything together
//!
//! ## Example Usage
//!
//! ```no_run
//! use foam::{Foam, FoamContext};
//!
//! # fn main() -> anyhow::Result<()> {
//! let ctx = FoamContext::new()?;
//! let foam = Foam::open(&ctx)?;
//!
//! for (folder, outcome) in foam.track(&["./project"]) {
//!     println!("{}: {:?}", folder.display(), outcome.map(|s| s.entries));
//! }
//!
//! // ... later
//! let results = foam.reset_all()?;
//! # Ok(())
//! # }
//! ```

/// Command-line interface definitions (argument parsing structures).
pub mod cli;
/// Command implementations behind the CLI.
#[allow(missing_docs)]
pub mod commands;
/// Configuration parsing, validation, and management.
#[allow(missing_docs)]
pub mod config;
/// Edit scripts between manifests.
pub mod diff;
/// The public track, list, undo, reset and gc operations.
pub mod engine;
/// Error types shared by every operation.
pub mod error;
/// Folder and store locking.
pub mod lock;
/// Captured tree descriptions.
pub mod manifest;
/// Output formatting and verbosity control.
pub mod output;
/// Tracking registry.
pub mod registry;
/// Applying edit scripts.
pub mod restore;
/// Content-addressable blob storage.
pub mod store;
/// Utility functions and helpers.
pub mod utils;
/// Tree traversal.
pub mod walker;

pub use engine::{Foam, FolderResults, GcReport, TrackSummary, TrackedInfo, UndoSummary};
pub use error::{ErrorKind, FoamError, Result};
pub use utils::hash;

use anyhow::Context;
use std::path::PathBuf;

/// Current version of the foam binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store directory name within the home directory.
pub const DEFAULT_STORE_DIR: &str = ".foam";

/// Default configuration file path relative to home directory.
pub const DEFAULT_CONFIG_PATH: &str = ".config/foam/config.toml";

/// Directory name for content-addressed blob storage.
pub const OBJECTS_DIR: &str = "objects";

/// Directory name for stored manifests.
pub const MANIFESTS_DIR: &str = "manifests";

/// Directory name for lock files.
pub const LOCKS_DIR: &str = "locks";

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "FOAM_CONFIG_PATH";

/// Environment variable overriding `core.store_path`.
pub const STORE_PATH_ENV: &str = "FOAM_STORE_PATH";

/// Where foam keeps its state and which settings it runs with.
///
/// # Examples
///
/// ```no_run
/// use foam::FoamContext;
///
/// # fn main() -> anyhow::Result<()> {
/// // Create context with default paths
/// let ctx = FoamContext::new()?;
///
/// // Create context with custom paths (for testing)
/// let ctx = FoamContext::new_explicit(
///     "/tmp/test_store".into(),
///     "/tmp/test_config.toml".into()
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FoamContext {
    /// Path to the store directory.
    pub store_path: PathBuf,

    /// Path to the configuration file, if one was loaded.
    pub config_path: Option<PathBuf>,

    /// Loaded configuration settings.
    pub config: config::Config,
}

impl FoamContext {
    /// Creates a new `FoamContext` by loading the configuration from
    /// `FOAM_CONFIG_PATH` or the default path.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined or if the configuration
    /// file cannot be read, created, or fails validation.
    pub fn new() -> anyhow::Result<Self> {
        // Check environment variable for config path first
        let config_path = if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            PathBuf::from(path)
        } else {
            let home = dirs::home_dir().context("Could not find home directory")?;
            home.join(DEFAULT_CONFIG_PATH)
        };

        let config = config::Config::load(&config_path)?;

        // Allow environment variable to override config store_path
        let store_path = std::env::var(STORE_PATH_ENV).map_or_else(
            |_| config.core.store_path.clone(),
            |path| utils::expand_tilde(&path),
        );

        Ok(Self {
            store_path,
            config_path: Some(config_path),
            config,
        })
    }

    /// Creates a new `FoamContext` with explicit paths, bypassing environment variables.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be loaded or created.
    pub fn new_explicit(store_path: PathBuf, config_path: PathBuf) -> anyhow::Result<Self> {
        let config = if config_path.exists() {
            config::Config::load(&config_path)?
        } else {
            // Create a default config with the provided store path
            let mut config = config::Config::default();
            config.core.store_path.clone_from(&store_path);
            config.save(&config_path)?;
            config
        };

        Ok(Self {
            store_path,
            config_path: Some(config_path),
            config,
        })
    }

    /// Context from an in-memory configuration, nothing read from disk
    #[must_use]
    pub fn from_config(store_path: PathBuf, mut config: config::Config) -> Self {
        config.core.store_path.clone_from(&store_path);
        Self {
            store_path,
            config_path: None,
            config,
        }
    }
}

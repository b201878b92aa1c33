//! Command-line interface definitions for foam.
//!
//! The CLI definitions are shared between the main binary and build tools (like xtask)
//! for man page generation.
//!
//! Note: Field-level documentation is provided via clap doc comments, so we allow
//! missing_docs for this module to avoid redundant documentation.

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Main CLI structure for foam.
#[derive(Parser)]
#[command(
    name = "foam",
    version = crate::VERSION,
    about = "Track folders and reset them back to their captured state",
    long_about = "Captures the exact state of folders (contents, structure, permissions and \
                  symlinks) into a content-addressed store and resets them on demand"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture the current state of folders, replacing earlier captures
    Track {
        /// Folders to track
        #[arg(conflicts_with_all = ["list", "undo"])]
        folders: Vec<PathBuf>,

        /// List tracked folders
        #[arg(short, long, conflicts_with = "undo")]
        list: bool,

        /// Stop tracking every folder and release stored data
        #[arg(long)]
        undo: bool,
    },

    /// Reset folders to their captured state (all tracked folders when none given)
    Reset {
        /// Folders to reset
        folders: Vec<PathBuf>,

        /// Show what would change without touching anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Remove stored data no longer referenced by any tracked folder
    Gc,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

//! Terminal messages for the foam CLI.
//!
//! Per-folder outcomes and notes go to stderr, colored and filtered by the
//! global [`Verbosity`]. Listings and dry-run scripts go to stdout so they
//! can be piped.

use crate::diff::EditOp;
use crate::error::FoamError;
use colored::Colorize;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

/// How much the CLI says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Failures only
    Quiet = 0,
    /// Outcomes and notes
    Normal = 1,
    /// Also per-operation details
    Verbose = 2,
}

static VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Normal as u8);

/// Set the global verbosity
pub fn set_verbosity(level: Verbosity) {
    VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Current global verbosity
pub fn get_verbosity() -> Verbosity {
    match VERBOSITY.load(Ordering::Relaxed) {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}

fn shown(level: Verbosity) -> bool {
    get_verbosity() as u8 >= level as u8
}

/// `<verb> <folder> (<summary>)`, e.g. "Tracked /srv/app (12 entries, 3.1 KB)"
pub fn folder_done(verb: &str, folder: &Path, summary: &str) {
    if !shown(Verbosity::Normal) {
        return;
    }
    eprintln!(
        "{} {} {}",
        verb.green().bold(),
        folder.display(),
        format!("({summary})").dimmed()
    );
}

/// A folder whose live tree already equals its capture
pub fn folder_unchanged(folder: &Path) {
    note(&format!("{} already matches its capture", folder.display()));
}

/// A folder whose operation failed, with the operations a stopped restore
/// never reached listed in verbose mode
pub fn folder_failed(err: &FoamError) {
    eprintln!("{}", format!("{}: {err}", err.kind()).red().bold());
    if let FoamError::Interrupted { remaining, .. } = err {
        for op in remaining {
            detail(&format!("not attempted: {op}"));
        }
    }
}

/// Dimmed remark, hidden in quiet mode
pub fn note(message: &str) {
    if shown(Verbosity::Normal) {
        eprintln!("{}", message.dimmed());
    }
}

/// Indented line shown only in verbose mode
pub fn detail(message: &str) {
    if shown(Verbosity::Verbose) {
        eprintln!("  {}", message.dimmed());
    }
}

/// One operation of a dry-run script on stdout, colored by effect
pub fn script_op(op: &EditOp) {
    let line = op.to_string();
    if op.is_removal() {
        println!("  {}", line.red());
    } else if op.is_creation() {
        println!("  {}", line.green());
    } else {
        println!("  {}", line.yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_thresholds() {
        set_verbosity(Verbosity::Quiet);
        assert!(!shown(Verbosity::Normal));

        set_verbosity(Verbosity::Verbose);
        assert_eq!(get_verbosity(), Verbosity::Verbose);
        assert!(shown(Verbosity::Normal));
        assert!(shown(Verbosity::Verbose));

        set_verbosity(Verbosity::Normal);
        assert!(!shown(Verbosity::Verbose));
    }
}

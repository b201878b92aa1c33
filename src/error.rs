//! Error types for foam.
//!
//! Every public operation reports failures through [`FoamError`]. Callers that
//! only care about the category (to pick an exit code or a message style) use
//! [`FoamError::kind`], which folds every variant into one of four kinds.

use crate::diff::EditOp;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, FoamError>;

/// Coarse category of a [`FoamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A root, tracked folder, blob or manifest does not exist.
    NotFound,
    /// Permission or I/O failure while walking, storing or applying.
    Access,
    /// Stored state failed an integrity check or could not be decoded.
    Corruption,
    /// The filesystem holds something incompatible with the requested change.
    Conflict,
}

impl ErrorKind {
    /// Short lowercase name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Access => "access",
            Self::Corruption => "corruption",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the capture, diff and restore engine.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum FoamError {
    #[error("{path}: {reason}")]
    NotFound { path: PathBuf, reason: String },

    #[error("cannot access {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("integrity check failed for {what}: {detail}")]
    Corruption { what: String, detail: String },

    #[error("conflict at {path}: {detail}")]
    Conflict { path: PathBuf, detail: String },

    /// A restore stopped part-way. Operations before `failed` were applied and
    /// left in place; `remaining` were never attempted.
    #[error(
        "restore of {root} stopped at `{failed}` after {applied} operation(s), {} not attempted: {cause}",
        .remaining.len()
    )]
    Interrupted {
        root: PathBuf,
        failed: EditOp,
        applied: usize,
        remaining: Vec<EditOp>,
        #[source]
        cause: Box<FoamError>,
    },
}

impl FoamError {
    /// Builds a `NotFound` error.
    pub fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Builds an `Access` error wrapping the underlying I/O failure.
    pub fn access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Access {
            path: path.into(),
            source,
        }
    }

    /// Builds a `Corruption` error for stored state named by `what`.
    pub fn corruption(what: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::Corruption {
            what: what.into(),
            detail: detail.to_string(),
        }
    }

    /// Builds a `Conflict` error.
    pub fn conflict(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Conflict {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Classifies a plain I/O failure on `path`.
    ///
    /// A missing path is `NotFound`; anything else is an access failure.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::not_found(path, err.to_string())
        } else {
            Self::access(path, err)
        }
    }

    /// The category of this error. An interrupted restore reports the kind of
    /// the operation that stopped it.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Access { .. } => ErrorKind::Access,
            Self::Corruption { .. } => ErrorKind::Corruption,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Interrupted { cause, .. } => cause.kind(),
        }
    }

    /// The filesystem path the error is about, when there is one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { path, .. } | Self::Access { path, .. } | Self::Conflict { path, .. } => {
                Some(path.as_path())
            }
            Self::Corruption { .. } => None,
            Self::Interrupted { cause, root, .. } => cause.path().or(Some(root.as_path())),
        }
    }
}

use crate::error::{FoamError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Read buffer used when streaming file contents through the hasher
const STREAM_BUFFER_SIZE: usize = 65536;

/// SHA-256 digest of a blob's uncompressed bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First two hex characters, used to shard the object directory
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("{:02x}", self.0[0])
    }

    /// Hex characters after the shard prefix
    #[must_use]
    pub fn suffix(&self) -> String {
        self.0[1..].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

impl FromStr for ContentHash {
    type Err = FoamError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 64 || !s.is_ascii() {
            return Err(FoamError::corruption(
                "content hash",
                format!("expected 64 hex characters, got {s:?}"),
            ));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|e| FoamError::corruption("content hash", e))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|e| FoamError::corruption("content hash", e))?;
        }
        Ok(Self(bytes))
    }
}

/// Incremental SHA-256 hasher producing a [`ContentHash`].
#[derive(Default, Clone)]
pub struct ContentHasher {
    /// Underlying digest state
    inner: Sha256,
}

impl ContentHasher {
    /// Start a new digest
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish the digest and reset the hasher for reuse
    pub fn finalize_reset(&mut self) -> ContentHash {
        ContentHash(self.inner.finalize_reset().into())
    }
}

/// Hash an in-memory byte slice
#[must_use]
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash(Sha256::digest(data).into())
}

/// Hash everything `reader` yields, returning the digest and the byte count.
///
/// The input is streamed through a fixed buffer, so memory use does not grow
/// with the size of the input.
///
/// # Errors
///
/// Returns the first read error from `reader`.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<(ContentHash, u64)> {
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((hasher.finalize_reset(), total))
}

/// Hash a file's contents by streaming it from disk.
///
/// # Errors
///
/// Returns an `Access` error if the file cannot be opened or read, including
/// when it disappeared after being listed.
pub fn hash_file(path: &Path) -> Result<(ContentHash, u64)> {
    let file = File::open(path).map_err(|e| FoamError::access(path, e))?;
    hash_reader(file).map_err(|e| FoamError::access(path, e))
}

/// Hash many files in parallel on the rayon pool.
///
/// # Errors
///
/// Returns the first failure encountered.
pub fn hash_files_parallel(paths: &[PathBuf]) -> Result<Vec<(ContentHash, u64)>> {
    paths.par_iter().map(|path| hash_file(path)).collect()
}

/// Remembers which hashes were already handled during one ingest pass so
/// identical files are stored once.
pub struct Deduplicator {
    /// Hashes claimed so far
    seen_hashes: dashmap::DashSet<ContentHash>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    /// Create an empty deduplicator
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen_hashes: dashmap::DashSet::new(),
        }
    }

    /// Claim `hash`. Returns `true` only for the first caller.
    pub fn claim(&self, hash: ContentHash) -> bool {
        self.seen_hashes.insert(hash)
    }

    /// Number of distinct hashes claimed
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen_hashes.len()
    }

    /// Whether nothing has been claimed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen_hashes.is_empty()
    }
}

//! Content-addressable blob store
//!
//! File contents are stored zstd-compressed under `objects/<2 hex>/<62 hex>`,
//! keyed by the SHA-256 of the uncompressed bytes. Identical content is stored
//! once. Every read re-hashes what it decompresses and fails with a
//! corruption error when the bytes no longer match their key.

use crate::error::{FoamError, Result};
use crate::utils::atomic_write;
use crate::utils::compress::{StreamError, compress_bytes, compress_stream};
use crate::utils::hash::{ContentHash, ContentHasher, hash_bytes};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use zstd::stream::read::Decoder;

/// Prefix of partially written objects inside a shard directory
const TEMP_PREFIX: &str = ".tmp-";

const COPY_BUFFER_SIZE: usize = 65536;

/// Blob storage shared by every tracked folder
pub struct ContentStore {
    /// The `objects/` directory
    objects_dir: PathBuf,
    compression_level: i32,
}

impl ContentStore {
    /// Open the store rooted at `objects_dir`; directories are created lazily
    #[must_use]
    pub const fn new(objects_dir: PathBuf, compression_level: i32) -> Self {
        Self {
            objects_dir,
            compression_level,
        }
    }

    /// Get the filesystem path for a given content hash.
    ///
    /// Objects are stored as `objects/<first-2-hex>/<remaining-hex>`.
    #[must_use]
    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        self.objects_dir.join(hash.prefix()).join(hash.suffix())
    }

    /// Whether a blob with this hash is stored
    #[must_use]
    pub fn has(&self, hash: &ContentHash) -> bool {
        self.object_path(hash).is_file()
    }

    /// Store `content` and return its hash. Storing content that is already
    /// present only confirms it.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be compressed or written
    pub fn put(&self, content: &[u8]) -> Result<ContentHash> {
        let hash = hash_bytes(content);
        if self.has(&hash) {
            return Ok(hash);
        }
        let compressed = compress_bytes("blob", content, self.compression_level)?;
        atomic_write(&self.object_path(&hash), &compressed)?;
        trace!(%hash, bytes = content.len(), "stored blob");
        Ok(hash)
    }

    /// Stream the file at `source` into the store under `expected`, the hash
    /// computed while walking. Returns `true` if a new blob was written.
    ///
    /// The file is re-hashed while it is compressed; if it no longer matches
    /// `expected` it changed after the walk and nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `Access` if the file or the store cannot be read or written
    /// and `Conflict` if the file changed while being captured
    pub fn ingest_file(&self, source: &Path, expected: &ContentHash) -> Result<bool> {
        if self.has(expected) {
            return Ok(false);
        }

        let target = self.object_path(expected);
        let shard = target
            .parent()
            .unwrap_or(self.objects_dir.as_path())
            .to_path_buf();
        fs::create_dir_all(&shard).map_err(|e| FoamError::access(&shard, e))?;

        let file = File::open(source).map_err(|e| FoamError::from_io(source, e))?;
        let mut reader = HashingReader {
            inner: file,
            hasher: ContentHasher::new(),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&shard)
            .map_err(|e| FoamError::access(&shard, e))?;

        let (consumed, _) = compress_stream(&mut reader, temp.as_file_mut(), self.compression_level)
            .map_err(|e| match e {
                StreamError::Read(e) => FoamError::access(source, e),
                StreamError::Write(e) => FoamError::access(&target, e),
            })?;

        let actual = reader.hasher.finalize_reset();
        if actual != *expected {
            return Err(FoamError::conflict(
                source,
                "file changed while it was being captured",
            ));
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| FoamError::access(temp.path(), e))?;
        temp.persist(&target)
            .map_err(|e| FoamError::access(&target, e.error))?;
        trace!(hash = %expected, bytes = consumed, "ingested blob");
        Ok(true)
    }

    /// Open a blob for streaming reads. The returned reader fails with
    /// [`io::ErrorKind::InvalidData`] at end of stream if the content does
    /// not hash to `hash`.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the blob is missing or its frame is unreadable
    /// and `Access` if it cannot be opened
    pub fn open(&self, hash: &ContentHash) -> Result<BlobReader> {
        let path = self.object_path(hash);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                FoamError::corruption(format!("blob {hash}"), "missing from the store")
            } else {
                FoamError::access(&path, e)
            }
        })?;
        let decoder = Decoder::new(file).map_err(|e| FoamError::corruption(format!("blob {hash}"), e))?;
        Ok(BlobReader {
            decoder,
            hasher: ContentHasher::new(),
            expected: *hash,
            verified: false,
        })
    }

    /// Read a whole blob into memory, verifying its hash
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the blob is missing or damaged
    pub fn read(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let mut reader = self.open(hash)?;
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|e| self.classify_read_error(hash, e))?;
        Ok(content)
    }

    /// Stream a blob into `dest`, verifying its hash. Returns the number of
    /// bytes written. `dest_path` names `dest` in errors.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the blob is damaged and `Access` if writing
    /// to `dest` fails
    pub fn copy_to(&self, hash: &ContentHash, dest: &mut File, dest_path: &Path) -> Result<u64> {
        let mut reader = self.open(hash)?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.classify_read_error(hash, e)),
            };
            dest.write_all(&buffer[..n])
                .map_err(|e| FoamError::access(dest_path, e))?;
            total += n as u64;
        }

        Ok(total)
    }

    fn classify_read_error(&self, hash: &ContentHash, err: io::Error) -> FoamError {
        if err.kind() == io::ErrorKind::PermissionDenied {
            FoamError::access(self.object_path(hash), err)
        } else {
            FoamError::corruption(format!("blob {hash}"), err)
        }
    }

    /// Every stored blob hash
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if the object directories cannot be read
    pub fn list(&self) -> Result<Vec<ContentHash>> {
        let shards = match fs::read_dir(&self.objects_dir) {
            Ok(shards) => shards,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FoamError::access(&self.objects_dir, e)),
        };

        let mut hashes = Vec::new();
        for shard in shards {
            let shard = shard.map_err(|e| FoamError::access(&self.objects_dir, e))?;
            let Some(prefix) = shard.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if prefix.len() != 2 || !shard.path().is_dir() {
                continue;
            }

            let objects = fs::read_dir(shard.path()).map_err(|e| FoamError::access(shard.path(), e))?;
            for object in objects {
                let object = object.map_err(|e| FoamError::access(shard.path(), e))?;
                let name = object.file_name();
                let Some(suffix) = name.to_str() else {
                    continue;
                };
                if suffix.starts_with(TEMP_PREFIX) {
                    continue;
                }
                if let Ok(hash) = format!("{prefix}{suffix}").parse::<ContentHash>() {
                    hashes.push(hash);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Number of stored blobs
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if the object directories cannot be read
    pub fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Delete one blob. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an `Access` error if removal fails
    pub fn remove(&self, hash: &ContentHash) -> Result<bool> {
        let path = self.object_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => {
                // Only succeeds once the shard is empty
                if let Some(shard) = path.parent() {
                    let _ = fs::remove_dir(shard);
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FoamError::access(path, e)),
        }
    }

    /// Delete every blob not in `live`. Returns how many were removed.
    ///
    /// Callers must hold the store lock exclusively so no ingest is in flight.
    ///
    /// # Errors
    ///
    /// Returns an `Access` error on the first blob that cannot be listed or removed
    pub fn release_unreferenced(&self, live: &HashSet<ContentHash>) -> Result<usize> {
        let mut removed = 0;
        for hash in self.list()? {
            if !live.contains(&hash) && self.remove(&hash)? {
                removed += 1;
            }
        }
        debug!(removed, retained = live.len(), "released unreferenced blobs");
        Ok(removed)
    }
}

/// Reader that hashes everything passing through it
struct HashingReader<R> {
    inner: R,
    hasher: ContentHasher,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Streaming, verifying reader over one stored blob
pub struct BlobReader {
    decoder: Decoder<'static, BufReader<File>>,
    hasher: ContentHasher,
    expected: ContentHash,
    verified: bool,
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.decoder.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        } else if !self.verified {
            let actual = self.hasher.finalize_reset();
            if actual != self.expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("content hashes to {actual}"),
                ));
            }
            self.verified = true;
        }
        Ok(n)
    }
}

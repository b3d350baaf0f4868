#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `lob-store` implements §3 (data model) and §4.C (content store) of the
//! protocol specification: the on-disk layout for LOB metadata and chunks
//! under a store root, atomic temp-then-rename installation, and the
//! completeness check that §4.D and §4.E build on.
//!
//! # Design
//!
//! [`Store`] is a thin wrapper around a root directory and the process-wide
//! chunk size; every method is a pure function of that state plus the
//! filesystem. It performs no network I/O and knows nothing about the wire
//! protocol beyond reusing [`lob_protocol::frame::copy_exact`] for bounded
//! buffered copies.
//!
//! # Invariants
//!
//! - [`Store::write_atomically`] never leaves a partially written file under
//!   its canonical name: content lands in a temp file first, and only a
//!   `rename` (same filesystem, by construction — the temp directory is a
//!   sibling of the destination) makes it visible.
//! - [`Store::check_lob_complete`] returns `false` on any missing chunk,
//!   short chunk, or malformed metadata — never panics, never partially
//!   trusts a corrupt record.
//! - A chunk's length is always [`Store::chunk_len`] for its index; the
//!   final chunk may be shorter, never longer, than `chunk_size`.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use lob_core::error::{ProtocolError, StorageError};
use lob_protocol::frame::copy_exact;
use serde::{Deserialize, Serialize};

/// On-disk metadata record: `{SHA, Size, NumChunks}` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobMetadata {
    /// 40-hex-character SHA-1 of the LOB's concatenated content.
    #[serde(rename = "SHA")]
    pub sha: String,
    /// Total byte length of the LOB.
    #[serde(rename = "Size")]
    pub size: u64,
    /// `ceil(Size / ChunkSize)`.
    #[serde(rename = "NumChunks")]
    pub num_chunks: u64,
}

/// Computes `NumChunks = ceil(size / chunk_size)`, with `size == 0` yielding
/// `0` chunks (§3).
#[must_use]
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        size.div_ceil(chunk_size)
    }
}

/// Computes the expected length of chunk `idx` of a LOB of the given total
/// `size`: `chunk_size` for every chunk but the last, and
/// `size - chunk_size * (num_chunks - 1)` for the last.
#[must_use]
pub fn chunk_len(size: u64, idx: u64, chunk_size: u64) -> u64 {
    let num_chunks = chunk_count(size, chunk_size);
    if num_chunks == 0 {
        return 0;
    }
    if idx + 1 < num_chunks {
        chunk_size
    } else {
        size - chunk_size * (num_chunks - 1)
    }
}

/// Walks `dir` and its ancestors until one exists, returning its
/// permission bits, or `0o775` if none can be statted (fresh `BasePath`).
#[cfg(unix)]
fn nearest_ancestor_mode(dir: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    let mut current = dir;
    loop {
        if let Ok(meta) = fs::metadata(current) {
            return meta.permissions().mode() & 0o777;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => return 0o775,
        }
    }
}

/// A content-addressed LOB store rooted at one directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    chunk_size: u64,
}

impl Store {
    /// Opens a store at `root` using `chunk_size` for chunk arithmetic.
    /// Does not create `root`; call [`Store::ensure_dir_exists`] first if
    /// needed.
    pub fn new(root: PathBuf, chunk_size: u64) -> Self {
        Self { root, chunk_size }
    }

    /// The store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The process-wide chunk size this store was opened with.
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn shard_dir(&self, sha: &str) -> PathBuf {
        self.root.join(&sha[0..3]).join(&sha[3..6])
    }

    /// Path of `sha`'s metadata record: `<root>/<sha[0:3]>/<sha[3:6]>/<sha>_meta`.
    #[must_use]
    pub fn meta_path(&self, sha: &str) -> PathBuf {
        self.shard_dir(sha).join(format!("{sha}_meta"))
    }

    /// Path of chunk `idx` of `sha`: `<root>/<sha[0:3]>/<sha[3:6]>/<sha>_<idx>`.
    #[must_use]
    pub fn chunk_path(&self, sha: &str, idx: u64) -> PathBuf {
        self.shard_dir(sha).join(format!("{sha}_{idx}"))
    }

    /// Creates `dir` and all missing ancestors, inheriting the mode of
    /// `dir`'s nearest already-existing ancestor — ordinarily `BasePath`
    /// itself, or a shard directory already created under it — falling
    /// back to `0775` on Unix if no ancestor can be statted. A no-op
    /// permission concept on other platforms.
    pub fn ensure_dir_exists(dir: &Path) -> io::Result<()> {
        #[cfg(unix)]
        let mode = nearest_ancestor_mode(dir);
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(mode);
            let _ = fs::set_permissions(dir, perms);
        }
        Ok(())
    }

    /// Streams exactly `size` bytes from `source` into a temp file, then
    /// renames it onto `dst_path`. Any error removes the temp file; a
    /// successful call is idempotent with a prior install of the same path
    /// (the rename simply overwrites).
    pub fn write_atomically(
        &self,
        dst_path: &Path,
        size: u64,
        source: &mut impl Read,
    ) -> Result<(), StorageError> {
        let parent = dst_path
            .parent()
            .expect("store paths always have a shard-directory parent");
        Self::ensure_dir_exists(parent).map_err(|e| StorageError::from_io(e, parent))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| StorageError::from_io(e, parent))?;

        copy_exact(source, temp.as_file_mut(), size).map_err(|protocol_err| match protocol_err {
            // The source ran dry before `size` bytes arrived — a framing
            // problem, not a disk condition; keep it as a plain `Io`.
            ProtocolError::StreamTruncated { expected, actual } => StorageError::Io {
                path: Some(dst_path.to_path_buf()),
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short write source: expected {expected} bytes, wrote {actual}"),
                ),
            },
            // A real I/O failure on either side of the copy (most often the
            // temp-file write). Preserve its `ErrorKind` via `from_io` so
            // `StorageError::is_fatal` still sees `StorageFull` /
            // `ReadOnlyFilesystem` and terminates the session per §7.
            ProtocolError::Transport(e) => StorageError::from_io(e, dst_path),
            other => StorageError::Io {
                path: Some(dst_path.to_path_buf()),
                source: io::Error::other(other.to_string()),
            },
        })?;

        let written = temp
            .as_file()
            .metadata()
            .map_err(|e| StorageError::from_io(e, dst_path))?
            .len();
        if written != size {
            return Err(StorageError::SizeMismatch {
                path: dst_path.to_path_buf(),
                expected: size,
                actual: written,
            });
        }

        temp.persist(dst_path)
            .map_err(|e| StorageError::from_io(e.error, dst_path))?;
        Ok(())
    }

    /// Writes `metadata` atomically to its canonical path.
    pub fn write_metadata(&self, metadata: &LobMetadata) -> Result<(), StorageError> {
        let path = self.meta_path(&metadata.sha);
        let bytes =
            serde_json::to_vec(metadata).expect("LobMetadata serialization cannot fail");
        self.write_atomically(&path, bytes.len() as u64, &mut io::Cursor::new(bytes))
    }

    /// Reads and parses the metadata record for `sha`, if present.
    pub fn read_metadata(&self, sha: &str) -> Result<Option<LobMetadata>, StorageError> {
        let path = self.meta_path(sha);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::from_io(e, &path)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::MalformedMetadata {
                path,
                reason: e.to_string(),
            })
    }

    /// §3's completeness check: `true` iff metadata exists, parses, and
    /// every chunk file exists with the exact expected size. Returns the
    /// LOB's total size alongside the verdict; `0` when incomplete.
    pub fn check_lob_complete(&self, sha: &str) -> Result<(bool, u64), StorageError> {
        let metadata = match self.read_metadata(sha)? {
            Some(m) => m,
            None => return Ok((false, 0)),
        };

        if metadata.sha != sha {
            return Ok((false, 0));
        }
        if metadata.num_chunks != chunk_count(metadata.size, self.chunk_size) {
            return Ok((false, 0));
        }

        for idx in 0..metadata.num_chunks {
            let path = self.chunk_path(sha, idx);
            let expected = chunk_len(metadata.size, idx, self.chunk_size);
            match fs::metadata(&path) {
                Ok(meta) if meta.len() == expected => {}
                _ => return Ok((false, 0)),
            }
        }

        Ok((true, metadata.size))
    }

    /// Splits `bytes` into chunks of `chunk_size` and installs each chunk
    /// plus the metadata record under `sha`, via [`Store::write_atomically`].
    /// Used by the delta applier, which reconstructs a target LOB fully in
    /// memory before it has a chunked on-disk form.
    pub fn install_lob_bytes(&self, sha: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let size = bytes.len() as u64;
        let num_chunks = chunk_count(size, self.chunk_size);

        for idx in 0..num_chunks {
            let start = (idx * self.chunk_size) as usize;
            let len = chunk_len(size, idx, self.chunk_size) as usize;
            let chunk = &bytes[start..start + len];
            let path = self.chunk_path(sha, idx);
            self.write_atomically(&path, len as u64, &mut io::Cursor::new(chunk.to_vec()))?;
        }

        self.write_metadata(&LobMetadata {
            sha: sha.to_string(),
            size,
            num_chunks,
        })
    }

    /// Streams `sha`'s chunks, in order, into `writer`. Does not include the
    /// metadata record itself; callers that need both read metadata
    /// separately via [`Store::read_metadata`].
    pub fn load_lob_concatenated(
        &self,
        sha: &str,
        writer: &mut impl Write,
    ) -> Result<(), StorageError> {
        let metadata = self
            .read_metadata(sha)?
            .ok_or_else(|| StorageError::NotFound {
                path: self.meta_path(sha),
            })?;

        for idx in 0..metadata.num_chunks {
            let path = self.chunk_path(sha, idx);
            let mut file = File::open(&path).map_err(|e| StorageError::from_io(e, &path))?;
            io::copy(&mut file, writer).map_err(|e| StorageError::from_io(e, &path))?;
        }
        Ok(())
    }
}

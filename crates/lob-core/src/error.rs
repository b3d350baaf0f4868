//! Error categorization for content-store and delta operations.
//!
//! §7 of the protocol specification distinguishes four error kinds —
//! Protocol, Transport, Storage, Policy — by how a handler must react to
//! them. This module covers the Storage kind: it never aborts the session by
//! itself, but callers use [`StorageError::is_fatal`] to decide whether an
//! I/O failure instead warrants terminating the connection (e.g. a
//! mid-stream write failure that has already corrupted the output).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// A storage-layer failure, categorized so handlers can decide whether to
/// report it to the client and continue, or treat it as fatal.
#[derive(Debug)]
pub enum StorageError {
    /// The requested object or path does not exist.
    NotFound {
        /// Path that was missing.
        path: PathBuf,
    },
    /// Metadata parsed but was structurally invalid.
    MalformedMetadata {
        /// Path to the metadata file.
        path: PathBuf,
        /// Description of the malformed field.
        reason: String,
    },
    /// A chunk or metadata file existed but had the wrong size.
    SizeMismatch {
        /// Path that mismatched.
        path: PathBuf,
        /// Size the caller expected.
        expected: u64,
        /// Size actually observed.
        actual: u64,
    },
    /// An underlying I/O error that does not fit a more specific case.
    Io {
        /// Path the operation was acting on, if known.
        path: Option<PathBuf>,
        /// The underlying error.
        source: io::Error,
    },
}

impl StorageError {
    /// Returns `true` when the error should terminate the session rather
    /// than being reported as a per-request JSON error.
    ///
    /// Disk-full and read-only-filesystem conditions are fatal: further
    /// requests on this connection would fail identically, so there is no
    /// point continuing. Not-found, malformed-metadata, and size-mismatch
    /// are always recoverable — they describe one LOB, not the store.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::StorageFull | io::ErrorKind::ReadOnlyFilesystem
            ),
            _ => false,
        }
    }

    /// Wraps an [`io::Error`] observed while operating on `path`.
    pub fn from_io(source: io::Error, path: &Path) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: Some(path.to_path_buf()),
                source,
            },
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "not found: {}", path.display()),
            Self::MalformedMetadata { path, reason } => {
                write!(f, "malformed metadata at {}: {reason}", path.display())
            }
            Self::SizeMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "size mismatch at {}: expected {expected}, got {actual}",
                path.display()
            ),
            Self::Io { path, source } => match path {
                Some(path) => write!(f, "I/O error at {}: {source}", path.display()),
                None => write!(f, "I/O error: {source}"),
            },
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A protocol-layer failure: malformed framing, an unknown method, or an
/// `Id` mismatch between request and response.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The JSON record was not valid UTF-8 or did not parse.
    #[error("malformed JSON record: {0}")]
    MalformedJson(String),

    /// `Method` did not match any entry in the dispatch table.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// A response's `Id` did not match the request it was answering.
    #[error("response Id {actual} does not match request Id {expected}")]
    IdMismatch {
        /// `Id` the request carried.
        expected: i64,
        /// `Id` the response carried.
        actual: i64,
    },

    /// Fewer than the declared number of raw bytes arrived before EOF.
    #[error("stream truncated: expected {expected} bytes, got {actual}")]
    StreamTruncated {
        /// Bytes the frame declared.
        expected: u64,
        /// Bytes actually read before EOF.
        actual: u64,
    },

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

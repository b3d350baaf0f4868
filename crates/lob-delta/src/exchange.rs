//! Apply and generate orchestration for `UploadDelta`,
//! `DownloadDeltaPrepare`, and `DownloadDeltaStart` (§4.E).
//!
//! This module is the only place [`DeltaCodec`], [`DeltaCache`], and
//! [`lob_store::Store`] meet. The daemon's handlers are expected to do
//! nothing more than frame I/O and policy checks (size limits, enabled
//! capabilities) around these two functions.

use std::io;

use lob_core::error::StorageError;
use lob_store::Store;
use sha1::{Digest, Sha1};

use crate::cache::DeltaCache;
use crate::codec::DeltaCodec;

/// Failure modes of applying or generating a delta.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// The base LOB is not complete in the store.
    #[error("base LOB {0} is not complete in the store")]
    BaseIncomplete(String),
    /// The target LOB is not complete in the store (generate-side only).
    #[error("target LOB {0} is not complete in the store")]
    TargetIncomplete(String),
    /// The codec reconstructed bytes whose SHA-1 does not match the
    /// declared target SHA; §9's `DeltaApplyMismatch`.
    #[error("reconstructed target does not match declared SHA: expected {expected}, got {actual}")]
    ApplyMismatch {
        /// SHA-1 the client declared for the target.
        expected: String,
        /// SHA-1 actually observed on the reconstructed bytes.
        actual: String,
    },
    /// A content-store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The codec itself failed (malformed delta, I/O failure on the
    /// in-memory buffers).
    #[error("delta codec error: {0}")]
    Codec(#[from] io::Error),
}

fn hex_sha1(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Applies `delta_bytes` against `base_sha` and installs the result under
/// `target_sha`, verifying its SHA-1 before anything is written to the
/// store.
///
/// Reconstruction happens entirely in memory before
/// [`lob_store::Store::install_lob_bytes`] is called, so a verification
/// failure never leaves a partial target visible (§9's open question on
/// concurrent delta apply: two concurrent applies of the same target each
/// reconstruct and verify independently before either renames a single
/// chunk into place).
///
/// On success, also best-effort installs `delta_bytes` into `cache` —
/// install failures are swallowed, matching §4.E's "ignore errors" rule.
///
/// Returns the installed target LOB's size in bytes.
pub fn apply_delta(
    store: &Store,
    codec: &dyn DeltaCodec,
    cache: &DeltaCache,
    base_sha: &str,
    target_sha: &str,
    delta_bytes: &[u8],
) -> Result<u64, DeltaError> {
    let (base_complete, _) = store.check_lob_complete(base_sha)?;
    if !base_complete {
        return Err(DeltaError::BaseIncomplete(base_sha.to_string()));
    }

    let mut base_bytes = Vec::new();
    store.load_lob_concatenated(base_sha, &mut base_bytes)?;

    let mut reconstructed = Vec::new();
    codec.decompress(
        &mut io::Cursor::new(&base_bytes),
        &mut io::Cursor::new(delta_bytes),
        &mut reconstructed,
    )?;

    let actual_sha = hex_sha1(&reconstructed);
    if actual_sha != target_sha {
        return Err(DeltaError::ApplyMismatch {
            expected: target_sha.to_string(),
            actual: actual_sha,
        });
    }

    let size = reconstructed.len() as u64;
    store.install_lob_bytes(target_sha, &reconstructed)?;
    let _ = cache.install(base_sha, target_sha, delta_bytes);

    Ok(size)
}

/// Returns the delta from `base_sha` to `target_sha`, serving it from
/// `cache` on a hit and regenerating it via `codec` on a miss (§4.E's
/// `DownloadDeltaPrepare`).
///
/// A freshly generated delta is best-effort installed into `cache`; install
/// failures are swallowed, since a missing cache entry only costs a future
/// regeneration, never correctness.
pub fn generate_delta(
    store: &Store,
    codec: &dyn DeltaCodec,
    cache: &DeltaCache,
    base_sha: &str,
    target_sha: &str,
) -> Result<Vec<u8>, DeltaError> {
    if let Ok(Some(cached)) = cache.load(base_sha, target_sha) {
        return Ok(cached);
    }

    let (base_complete, _) = store.check_lob_complete(base_sha)?;
    if !base_complete {
        return Err(DeltaError::BaseIncomplete(base_sha.to_string()));
    }
    let (target_complete, _) = store.check_lob_complete(target_sha)?;
    if !target_complete {
        return Err(DeltaError::TargetIncomplete(target_sha.to_string()));
    }

    let mut base_bytes = Vec::new();
    store.load_lob_concatenated(base_sha, &mut base_bytes)?;
    let mut target_bytes = Vec::new();
    store.load_lob_concatenated(target_sha, &mut target_bytes)?;

    let mut delta_bytes = Vec::new();
    codec.compress(
        &mut io::Cursor::new(&base_bytes),
        &mut io::Cursor::new(&target_bytes),
        &mut delta_bytes,
    )?;

    let _ = cache.install(base_sha, target_sha, &delta_bytes);
    Ok(delta_bytes)
}

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `lob-delta` is the binary-delta exchange subsystem (§4.E): a codec
//! abstraction that turns a `(base, target)` byte pair into an opaque delta
//! and back, an on-disk cache keyed by `<baseSHA>_<targetSHA>`, and the
//! apply/generate orchestration that `UploadDelta` and
//! `DownloadDeltaPrepare`/`DownloadDeltaStart` delegate to.
//!
//! # Design
//!
//! The VCDIFF-family codec itself is explicitly out of scope upstream; this
//! crate defines [`codec::DeltaCodec`] as the opaque interface the rest of
//! the system depends on, and ships one concrete implementation,
//! [`codec::RollingSignatureCodec`], so the server is runnable end to end.
//! [`cache::DeltaCache`] knows nothing about codecs or the content store —
//! it is a flat, regenerable key-value directory. [`exchange`] is the only
//! module that ties codec, cache, and [`lob_store::Store`] together, mapping
//! directly onto the two delta handlers' bodies.
//!
//! # Invariants
//!
//! - A delta cache entry is always regenerable: losing it never loses data,
//!   only the cost of recomputing it (§3's "Delta cache root" invariant).
//! - [`exchange::apply_delta`] never leaves a partially written target LOB
//!   visible: the reconstructed byte stream is fully SHA-1 verified in
//!   memory before any chunk is installed.

/// The opaque delta codec interface plus the default rolling-checksum
/// implementation.
pub mod codec;

/// On-disk, regenerable delta cache keyed by `<baseSHA>_<targetSHA>`.
pub mod cache;

/// Apply and generate orchestration tying a codec, cache, and content store
/// together.
pub mod exchange;

pub use codec::{DeltaCodec, RollingSignatureCodec};
pub use cache::DeltaCache;
pub use exchange::{apply_delta, generate_delta, DeltaError};

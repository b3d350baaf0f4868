#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `lob-protocol` is the wire layer of the smart LOB transfer protocol (§4.A,
//! §4.B): framing NUL-terminated JSON records and raw byte runs on one
//! full-duplex stream, and the typed request/response bodies for every
//! method in the closed method table.
//!
//! # Design
//!
//! [`frame`] owns byte-level framing only — it knows nothing about method
//! names or handler dispatch. [`envelope`] defines the `{Id, Method, Params}`
//! request shape and the typed params/result bodies per method. The
//! dispatcher that ties a [`frame::FrameReader`]/[`frame::FrameWriter`] pair
//! to a handler table lives in `lob-daemon`, one layer up, because dispatch
//! needs the content store and delta subsystem that this crate does not
//! depend on.
//!
//! # Invariants
//!
//! - A [`frame::FrameWriter`] never interleaves a JSON record's bytes with
//!   another write: [`frame::FrameWriter::write_json`] serializes into a
//!   buffer and performs one `write_all` call for the record plus its `NUL`
//!   terminator.
//! - [`frame::FrameReader::read_exact_raw`] copies in bounded increments
//!   (`frame::COPY_BUFFER_SIZE`) and never allocates a buffer sized by an
//!   untrusted `N`.

/// Length-delimited JSON records and raw byte runs over a duplex stream.
pub mod frame;

/// Request/response envelope and per-method body types.
pub mod envelope;

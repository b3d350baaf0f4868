#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `lob-core` exposes the process-wide facilities shared by every crate in the
//! LOB transfer server: the closed [`exit_code::ExitCode`] table from §6 of the
//! protocol specification, the [`error`] categorization used by handlers to
//! decide whether a storage failure is reported to the client or terminates
//! the session, and the resolved [`config::ResolvedConfig`] record a session
//! is constructed from.
//!
//! # Design
//!
//! Config *parsing* (the two-tier system/user file lookup) and CLI argument
//! handling are explicitly out of scope for this crate — they live in the
//! `lobd` binary, which is the only place a `ResolvedConfig` is built from
//! untrusted input. Everything downstream of that point only ever sees the
//! already-validated record.
//!
//! # Invariants
//!
//! - [`exit_code::ExitCode`] values never change their numeric discriminant;
//!   callers persist them across process boundaries (shell exit status).
//! - [`error::StorageError`] never panics while categorizing an
//!   [`std::io::Error`]; only `StorageFull` and `ReadOnlyFilesystem` are
//!   fatal (§7's Storage row), every other kind is reported to the client
//!   and the session continues.

/// Exit codes returned by the `lobd` process, matching §6 of the protocol
/// specification.
pub mod exit_code;

/// Error categorization shared by the content store and delta subsystem.
pub mod error;

/// Resolved, already-validated session configuration.
pub mod config;

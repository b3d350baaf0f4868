#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `lob-daemon` is Component B (§2): it wires the wire-format crate
//! (`lob-protocol`), the content store (`lob-store`), and the delta
//! subsystem (`lob-delta`) into the session loop a server process actually
//! runs. Everything upstream of [`session::run_session`] — process argument
//! parsing, the two-tier config file lookup, and transport establishment —
//! is out of scope here and lives in the `lobd` binary at the workspace
//! root.
//!
//! # Design
//!
//! [`dispatch::dispatch`] is the single table-driven `match` over the
//! closed method set (§9: "table-driven to keep the state machine
//! auditable"); [`handlers`] holds one function per method, each decoding
//! its own `Params` so a malformed body for one method can never corrupt
//! another's. [`session::run_session`] is the loop that ties a duplex
//! stream to that dispatch table.
//!
//! # Invariants
//!
//! - A storage failure judged [`lob_core::error::StorageError::is_fatal`]
//!   always propagates as [`error::SessionError::FatalStorage`] and ends
//!   the session; everything else becomes a JSON error response and the
//!   loop continues (§7's Storage row).
//! - [`session::run_session`] never starts reading the next request before
//!   the current one's full response — prelude, raw run, and/or terminal
//!   JSON — has been written (§5's "strictly serial" guarantee).

/// Table-driven method dispatch over the closed method set (§4.B, §9).
pub mod dispatch;

/// Session-terminating errors and their exit-code mapping (§6, §7).
pub mod error;

/// Handler bodies for every method in the closed table (§4.D, §4.E).
pub mod handlers;

/// The per-connection decode-dispatch-respond loop (§2, §4.B, §5).
pub mod session;

pub use error::SessionError;
pub use session::{run_session, ADVERTISED_CAPS};

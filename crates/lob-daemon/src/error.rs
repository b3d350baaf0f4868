//! Session-terminating errors and their exit-code mapping (§6, §7).
//!
//! Only failures that abort the dispatch loop live here. A recoverable
//! [`lob_core::error::StorageError`] never reaches this type — handlers
//! convert it to a JSON error response via `crate::handlers::storage_outcome`
//! unless [`lob_core::error::StorageError::is_fatal`] says otherwise.

use std::fmt;

use lob_core::error::ProtocolError;
use lob_core::exit_code::ExitCode;

/// A failure that ends the session: the dispatch loop stops and the process
/// exits with [`SessionError::exit_code`].
#[derive(Debug)]
pub enum SessionError {
    /// The input stream could not be read at all (§6 exit code `21`).
    InputRead(String),
    /// A JSON record was not valid UTF-8 or did not parse (§6 exit code `22`).
    MalformedJson(String),
    /// A response could not be serialized or written to the client (§6 exit
    /// code `23`).
    ResponseMarshal(String),
    /// A storage error [`lob_core::error::StorageError::is_fatal`] judged
    /// unrecoverable (disk full, read-only filesystem).
    FatalStorage(String),
    /// An internal invariant was violated, or a mid-stream copy failed after
    /// bytes had already been written (§4.D: "the session must terminate").
    Internal(String),
}

impl SessionError {
    /// Maps this error onto the closed exit-code set.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InputRead(_) => ExitCode::InputReadFailure,
            Self::MalformedJson(_) => ExitCode::MalformedJson,
            Self::ResponseMarshal(_) => ExitCode::ResponseMarshalFailure,
            Self::FatalStorage(_) | Self::Internal(_) => ExitCode::Internal,
        }
    }

    pub(crate) fn marshal(err: ProtocolError) -> Self {
        Self::ResponseMarshal(err.to_string())
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputRead(m) => write!(f, "input read failure: {m}"),
            Self::MalformedJson(m) => write!(f, "malformed JSON: {m}"),
            Self::ResponseMarshal(m) => write!(f, "response marshal failure: {m}"),
            Self::FatalStorage(m) => write!(f, "fatal storage error: {m}"),
            Self::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedJson(m) => Self::MalformedJson(m),
            ProtocolError::Transport(e) => Self::InputRead(e.to_string()),
            ProtocolError::StreamTruncated { expected, actual } => Self::InputRead(format!(
                "stream truncated: expected {expected} bytes, got {actual}"
            )),
            ProtocolError::IdMismatch { expected, actual } => Self::MalformedJson(format!(
                "response Id {actual} did not match request Id {expected}"
            )),
            ProtocolError::UnknownMethod(m) => Self::MalformedJson(format!("unknown method: {m}")),
        }
    }
}

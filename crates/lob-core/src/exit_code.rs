//! Centralized exit code definitions for the LOB transfer server.
//!
//! These mirror §6 of the protocol specification exactly: every code the
//! session can terminate with is a named variant here, so `lobd::main`
//! never has to hardcode a raw integer.

use std::fmt;

/// Process exit codes for a `lobd` session.
///
/// # Examples
///
/// ```
/// use lob_core::exit_code::ExitCode;
///
/// assert_eq!(ExitCode::Ok.as_i32(), 0);
/// assert_eq!(ExitCode::MissingBasePath.as_i32(), 12);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Normal completion.
    Ok = 0,

    /// `base-path` was not supplied in the resolved configuration.
    MissingBasePath = 12,

    /// `repo-path` failed validation (absolute when disallowed, or contains
    /// `..` components).
    InvalidRepoPath = 15,

    /// The delta cache directory could not be created.
    CannotCreateDeltaCache = 16,

    /// A read from the input stream failed below the transport layer.
    InputReadFailure = 21,

    /// A JSON record could not be decoded.
    MalformedJson = 22,

    /// A JSON response failed to marshal.
    ResponseMarshalFailure = 23,

    /// A handler panicked; the panic was caught at the session boundary.
    Internal = 99,
}

impl ExitCode {
    /// Returns the numeric exit status.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns a short, stable description suitable for diagnostics.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::MissingBasePath => "missing base-path",
            Self::InvalidRepoPath => "invalid repo path",
            Self::CannotCreateDeltaCache => "cannot create delta cache directory",
            Self::InputReadFailure => "input read failure",
            Self::MalformedJson => "malformed JSON record",
            Self::ResponseMarshalFailure => "response marshal failure",
            Self::Internal => "fatal internal error",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        let value = code.as_i32().clamp(0, 255) as u8;
        Self::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_numbers() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::MissingBasePath.as_i32(), 12);
        assert_eq!(ExitCode::InvalidRepoPath.as_i32(), 15);
        assert_eq!(ExitCode::CannotCreateDeltaCache.as_i32(), 16);
        assert_eq!(ExitCode::InputReadFailure.as_i32(), 21);
        assert_eq!(ExitCode::MalformedJson.as_i32(), 22);
        assert_eq!(ExitCode::ResponseMarshalFailure.as_i32(), 23);
        assert_eq!(ExitCode::Internal.as_i32(), 99);
    }

    #[test]
    fn display_uses_description() {
        assert_eq!(ExitCode::MalformedJson.to_string(), "malformed JSON record");
    }

    #[test]
    fn converts_to_process_exit_code() {
        let _code: std::process::ExitCode = ExitCode::Internal.into();
    }
}

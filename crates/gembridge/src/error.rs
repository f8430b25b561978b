use std::fmt;

use crate::remote_error::RemoteError;

/// Result alias used throughout the crate.
pub type GemResult<T> = Result<T, GemError>;

/// Error type for every session, proxy and marshaling operation.
///
/// Failures raised by the remote VM arrive as [`GemError::Remote`]; everything else is detected
/// locally before (or instead of) making a native call.
#[derive(Debug, Clone)]
pub enum GemError {
    /// The caller or the native layer broke an interface contract, e.g. an oop of the wrong
    /// kind was decoded or a proxy was handed to a session that does not own it.
    ProtocolViolation(String),
    /// A value does not fit the requested encoding.
    OutOfRange(String),
    /// No conversion exists for this value or remote class.
    Unsupported(String),
    /// A message send supplied the wrong number of arguments for its selector.
    ArityMismatch {
        selector: String,
        expected: usize,
        given: usize,
    },
    /// A linked session is already logged in in this process.
    SingletonViolation,
    /// The linked session is not the process's current session.
    NotCurrentSession,
    /// The session is logged out (or the remote side no longer recognises it).
    InvalidSession,
    /// The remote VM reported an error.
    Remote(Box<RemoteError>),
    /// A GCI shared library could not be loaded or bound.
    Library(String),
    /// A connection file could not be read or parsed.
    Config(String),
}

impl fmt::Display for GemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::ArityMismatch {
                selector,
                expected,
                given,
            } => write!(f, "{selector} takes exactly {expected} arguments ({given} given)"),
            Self::SingletonViolation => {
                write!(f, "there is an active linked session; can not create another session")
            }
            Self::NotCurrentSession => write!(f, "expected session to be the current session"),
            Self::InvalidSession => write!(f, "session is not logged in"),
            Self::Remote(error) => write!(f, "{error}"),
            Self::Library(msg) => write!(f, "library error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for GemError {}

impl From<RemoteError> for GemError {
    fn from(error: RemoteError) -> Self {
        Self::Remote(Box::new(error))
    }
}

impl From<serde_json::Error> for GemError {
    fn from(error: serde_json::Error) -> Self {
        Self::Config(error.to_string())
    }
}

impl GemError {
    /// The remote error payload, when this error came from the remote VM.
    #[must_use]
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }
}

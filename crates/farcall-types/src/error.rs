//! Shared error types for farcall invocations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by an invocation, locally or across the wire.
///
/// Every variant carries a plain message so that an error can be shipped to
/// a remote caller as `{class, message}` and rebuilt without loss.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    /// The call itself was malformed (null method, null argument, unexported item).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No method with the requested name and exact parameter types exists.
    #[error("No such method: {0}")]
    NoSuchMethod(String),

    /// A named entry (registry name, file, exported item) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A type or reference kind could not be loaded in this process.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The peer could not be reached or the connection broke.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Bytes on the wire or in a capsule were not validly framed.
    #[error("Format error: {0}")]
    Format(String),

    /// The target raised an error in its own logic.
    #[error("{0}")]
    Application(String),
}

/// Alias for Result with InvokeError.
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Wire-level discriminant of an [`InvokeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    InvalidArgument,
    NoSuchMethod,
    NotFound,
    Resolution,
    Connectivity,
    Format,
    Application,
}

impl InvokeError {
    /// Build an application error from anything printable.
    pub fn application(err: impl std::fmt::Display) -> Self {
        Self::Application(err.to_string())
    }

    /// The wire discriminant for this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument(_) => ErrorClass::InvalidArgument,
            Self::NoSuchMethod(_) => ErrorClass::NoSuchMethod,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Resolution(_) => ErrorClass::Resolution,
            Self::Connectivity(_) => ErrorClass::Connectivity,
            Self::Format(_) => ErrorClass::Format,
            Self::Application(_) => ErrorClass::Application,
        }
    }

    /// The bare message, without the class prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::NoSuchMethod(m)
            | Self::NotFound(m)
            | Self::Resolution(m)
            | Self::Connectivity(m)
            | Self::Format(m)
            | Self::Application(m) => m,
        }
    }

    /// Rebuild an error received as `{class, message}`.
    pub fn from_parts(class: ErrorClass, message: String) -> Self {
        match class {
            ErrorClass::InvalidArgument => Self::InvalidArgument(message),
            ErrorClass::NoSuchMethod => Self::NoSuchMethod(message),
            ErrorClass::NotFound => Self::NotFound(message),
            ErrorClass::Resolution => Self::Resolution(message),
            ErrorClass::Connectivity => Self::Connectivity(message),
            ErrorClass::Format => Self::Format(message),
            ErrorClass::Application => Self::Application(message),
        }
    }

    /// True when the peer could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// True when the peer answered but rejected the shape of the call.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::NoSuchMethod(_) | Self::NotFound(_) | Self::Resolution(_)
        )
    }
}

impl From<std::io::Error> for InvokeError {
    fn from(e: std::io::Error) -> Self {
        Self::Connectivity(e.to_string())
    }
}

//! Common error types for civicsync.

use thiserror::Error;

/// Top-level error type for civicsync operations.
///
/// Transport failures are split by what the caller can do about them:
/// `Unreachable` writes are queued for replay, `Rejected` and `AuthExpired`
/// go straight back to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The request never received a response (timeout, DNS or connect failure).
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-2xx status other than 401/403.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server refused the bearer credential (401/403).
    #[error("Authentication expired or invalid ({status})")]
    AuthExpired { status: u16 },

    /// Durable store read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fieldless classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unreachable,
    Rejected,
    AuthExpired,
    Storage,
    Io,
    Serialization,
    InvalidInput,
    NotFound,
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unreachable(_) => ErrorKind::Unreachable,
            Error::Rejected { .. } => ErrorKind::Rejected,
            Error::AuthExpired { .. } => ErrorKind::AuthExpired,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// True if no response was received, i.e. a write should be queued.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Unreachable(_))
    }

    /// True if the durable store failed.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }

    /// HTTP status carried by the error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Rejected { status, .. } | Error::AuthExpired { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the MonkDB client.

use thiserror::Error;

/// The main error type for MonkDB operations.
#[derive(Debug, Error)]
pub enum MonkError {
    /// Transport failure, or every retry attempt was exhausted.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        trace: Option<String>,
    },

    /// Caller misuse: empty statement, closed connection, bad arguments.
    #[error("Programming error: {message}")]
    Programming {
        message: String,
        trace: Option<String>,
    },

    /// The server rejected the data itself (bad value, overflow, ...).
    #[error("Data error: {message}")]
    Data {
        message: String,
        trace: Option<String>,
    },

    /// Constraint violation, e.g. a duplicate primary key.
    #[error("Integrity error: {message}")]
    Integrity {
        message: String,
        trace: Option<String>,
    },

    /// The server reported an internal failure.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        trace: Option<String>,
    },

    /// The statement uses a feature the server does not support.
    #[error("Not supported: {message}")]
    NotSupported {
        message: String,
        trace: Option<String>,
    },

    /// Authentication or authorization failure.
    #[error("Operational error: {message}")]
    Operational {
        message: String,
        trace: Option<String>,
    },

    /// The response could not be decoded (unknown type code, bad shape).
    #[error("Interface error: {0}")]
    Interface(String),

    /// A type descriptor has no valid converter structure.
    #[error("Unsupported column type: {0}")]
    UnsupportedType(String),

    /// The cursor is before the first row or past the last one.
    #[error("Cursor is not at a valid row")]
    InvalidCursorPosition,

    /// No column with that name or index in the current result.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// The pool has no endpoint it could hand out.
    #[error("No MonkDB servers available")]
    NoEndpointsAvailable,

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Blob not found: {container}/{digest}")]
    DigestNotFound { container: String, digest: String },

    #[error("Blob location not found: {container}/{digest}")]
    BlobLocationNotFound { container: String, digest: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonkError {
    /// Create a connection error without a trace.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            trace: None,
        }
    }

    /// Create a programming error without a trace.
    pub fn programming(message: impl Into<String>) -> Self {
        Self::Programming {
            message: message.into(),
            trace: None,
        }
    }

    /// Server-side stack trace attached to the error, if any.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Connection { trace, .. }
            | Self::Programming { trace, .. }
            | Self::Data { trace, .. }
            | Self::Integrity { trace, .. }
            | Self::Internal { trace, .. }
            | Self::NotSupported { trace, .. }
            | Self::Operational { trace, .. } => trace.as_deref(),
            _ => None,
        }
    }

    /// Whether the retry engine may try another endpoint after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NoEndpointsAvailable)
    }

    /// Caller misuse that is surfaced immediately and never retried.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::Programming { .. } | Self::InvalidCursorPosition | Self::ColumnNotFound(_)
        )
    }
}

impl From<serde_json::Error> for MonkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Interface(e.to_string())
    }
}

/// Result type alias for MonkDB operations.
pub type MonkResult<T> = Result<T, MonkError>;

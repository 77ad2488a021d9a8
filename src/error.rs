//! Error types for the bedlevel library.

use thiserror::Error;

/// The main error type for bed leveling operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection could not be opened or was lost.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// A report matched a known shape but carried an unparseable value.
    #[error("malformed report {line:?}: {reason}")]
    MalformedReport { line: String, reason: String },

    /// Command issued in a state that forbids it.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Command argument was rejected.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// Line framing errors.
#[derive(Debug, Error)]
pub enum LineError {
    /// Received line is not valid UTF-8.
    #[error("line is not valid UTF-8 ({len} bytes)")]
    InvalidUtf8 { len: usize },

    /// No terminator arrived before the buffer limit.
    #[error("line too long: {size} bytes exceeds maximum {max}")]
    TooLong { size: usize, max: usize },
}

impl Error {
    /// Shorthand for an [`Error::InvalidOperation`].
    pub(crate) fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Error::InvalidArgument`].
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Shorthand for the "not connected" [`Error::InvalidOperation`].
    pub(crate) fn not_connected() -> Self {
        Self::invalid_operation("not connected")
    }

    /// Returns true for errors raised while opening, using or closing the device.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Serial(_) | Self::Io(_) | Self::Connection { .. }
        )
    }
}

/// Result type alias for bedlevel operations.
pub type Result<T> = std::result::Result<T, Error>;

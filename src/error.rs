//! Transfer-level error taxonomy.
//!
//! Every failure is surfaced synchronously to the call that triggered it.
//! Partial completion is not an error: a Read that returns fewer bytes than
//! requested, or a Write whose bytes are still queued behind a flow-control
//! stall, both succeed.

use crate::port::PortError;
use crate::state::SessionState;
use crate::timeout::Timeout;
use std::fmt;
use std::io;
use thiserror::Error;

/// A specialized `Result` type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// The blocking operation a [`TransferError::Timeout`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Flush,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Flush => write!(f, "flush"),
        }
    }
}

/// Errors returned by the transfer engine and the caller-facing line.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The operation was issued while the session is not open.
    #[error("Operation requires an open port, but the port is {state}")]
    InvalidState { state: SessionState },

    /// The session was closed while the operation was blocked.
    #[error("The port was closed while the operation was pending")]
    Disposed,

    /// The deadline elapsed before the operation could complete.
    ///
    /// `completed` is the number of bytes enqueued (write) or consumed (read)
    /// before expiry; they are never rolled back.
    #[error("The {operation} operation timed out after {timeout} ({completed} bytes completed)")]
    Timeout {
        operation: Operation,
        timeout: Timeout,
        completed: usize,
    },

    /// The encoding cannot convert characters to a deterministic number of bytes.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Inbound bytes arrived faster than the caller drained them.
    #[error("Receive buffer overrun: {buffered} bytes buffered, capacity {capacity}")]
    Overrun { buffered: usize, capacity: usize },

    /// A required value was absent.
    #[error("Argument '{0}' must not be null")]
    NullArgument(&'static str),

    /// A value outside its valid domain.
    #[error("Invalid value for '{name}': {message}")]
    InvalidArgument { name: &'static str, message: String },

    /// The port boundary reported a failure.
    #[error(transparent)]
    Port(#[from] PortError),
}

impl TransferError {
    pub fn invalid_state(state: SessionState) -> Self {
        Self::InvalidState { state }
    }

    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    pub fn unsupported_encoding(message: impl Into<String>) -> Self {
        Self::UnsupportedEncoding(message.into())
    }

    /// True for the deadline-elapsed condition.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<TransferError> for io::Error {
    fn from(err: TransferError) -> Self {
        let kind = match &err {
            TransferError::InvalidState { .. } => io::ErrorKind::NotConnected,
            TransferError::Disposed => io::ErrorKind::BrokenPipe,
            TransferError::Timeout { .. } => io::ErrorKind::TimedOut,
            TransferError::UnsupportedEncoding(_) => io::ErrorKind::Unsupported,
            TransferError::Overrun { .. } => io::ErrorKind::InvalidData,
            TransferError::NullArgument(_) | TransferError::InvalidArgument { .. } => {
                io::ErrorKind::InvalidInput
            }
            TransferError::Port(PortError::Io(e)) => e.kind(),
            TransferError::Port(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

//! Unified error types for the RPC client.
//!
//! Every public operation returns [`Error`].  Framing and decode failures
//! on the receive path never reach a caller: they are logged and the
//! offending frame is dropped.  Only connection-lifecycle failures are
//! surfaced to in-flight calls, and each call's outcome is independent.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible client operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The channel never reached the ready state, or the link is not
    /// available in this environment.
    Connection(String),
    /// No matching response arrived before the call's deadline.
    Timeout { method_id: u8, timeout_ms: u64 },
    /// The transport was disconnected while the call was outstanding.
    Disconnected,
    /// The operation requires a connected transport.
    NotConnected,
    /// Arguments could not be encoded for the requested method.
    Codec(CodecError),
    /// The physical link refused an outgoing write.
    Link(LinkError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection failed: {msg}"),
            Self::Timeout {
                method_id,
                timeout_ms,
            } => write!(f, "RPC timeout ({timeout_ms}ms) for method {method_id}"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Failures of the per-method binary codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The method id is not present in the schema.
    UnknownMethod(u8),
    /// Argument count does not match the method's parameter list.
    ArgumentCount { expected: usize, got: usize },
    /// A value does not have the shape its field type requires.
    TypeMismatch { field: String, expected: &'static str },
    /// A required record field was not supplied.
    MissingField(String),
    /// A string or list is longer than its length prefix can express.
    TooLong(String),
    /// The payload ended before the layout was fully read.
    Truncated { needed: usize, available: usize },
    /// A string field is not valid UTF-8.
    InvalidUtf8(String),
    /// The encoded payload exceeds the 16-bit envelope length field.
    PayloadTooLarge(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod(id) => write!(f, "unknown method id {id}"),
            Self::ArgumentCount { expected, got } => {
                write!(f, "expected {expected} arguments, got {got}")
            }
            Self::TypeMismatch { field, expected } => {
                write!(f, "field '{field}': expected {expected}")
            }
            Self::MissingField(name) => write!(f, "missing required field '{name}'"),
            Self::TooLong(field) => write!(f, "field '{field}' exceeds its length prefix"),
            Self::Truncated { needed, available } => {
                write!(f, "payload truncated: need {needed} bytes, {available} left")
            }
            Self::InvalidUtf8(field) => write!(f, "field '{field}' is not valid UTF-8"),
            Self::PayloadTooLarge(len) => {
                write!(f, "payload of {len} bytes exceeds the 65535-byte frame limit")
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// Errors raised by a physical link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The underlying device or API does not exist in this environment.
    Unavailable(String),
    /// The link is not open.
    NotOpen,
    /// OS-level I/O failure.
    Io(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(what) => write!(f, "{what} is not available"),
            Self::NotOpen => write!(f, "link is not open"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

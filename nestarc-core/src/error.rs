//! Error types for nestarc operations.
//!
//! Every failure raised by an accessor, the registry or the navigation
//! engine is an [`ArchiveError`]. The variants follow the error classes an
//! embedding application distinguishes: bad arguments, missing
//! implementations, unsupported operations, structural parse failures,
//! conflicting modes, absent data, and unresolved locations.

use std::io;
use thiserror::Error;

/// The main error type for nestarc operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error from the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An argument was outside the accepted range.
    #[error("Argument out of range: {name} = {value}")]
    ArgumentOutOfRange {
        /// Name of the offending argument.
        name: &'static str,
        /// Rendered value that was rejected.
        value: String,
    },

    /// No constructor is registered for a format/implementation pair.
    #[error("No implementation registered for {format} ({implementation})")]
    NoImplementation {
        /// Requested format.
        format: String,
        /// Requested implementation kind.
        implementation: String,
    },

    /// The operation is not supported by this backend.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// Description of the rejected operation.
        operation: String,
    },

    /// Invalid magic number in a header.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// The operation conflicts with the accessor's mode or state.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of the conflict.
        message: String,
    },

    /// Required data is empty or absent.
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Description of what was missing.
        message: String,
    },

    /// A location could not be resolved.
    #[error("Not found: {location}")]
    NotFound {
        /// The unresolved location string.
        location: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch {
        /// Expected CRC value from the archive.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },
}

/// Result type alias for nestarc operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an argument-out-of-range error.
    pub fn out_of_range(name: &'static str, value: impl ToString) -> Self {
        Self::ArgumentOutOfRange {
            name,
            value: value.to_string(),
        }
    }

    /// Create a missing-implementation error.
    pub fn no_implementation(format: impl ToString, implementation: impl ToString) -> Self {
        Self::NoImplementation {
            format: format.to_string(),
            implementation: implementation.to_string(),
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a not-found error for a location.
    pub fn not_found(location: impl Into<String>) -> Self {
        Self::NotFound {
            location: location.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Recover an error that was tunnelled through an [`io::Error`].
    ///
    /// Readers handed out by accessors can only fail with `io::Error`; a
    /// checksum failure travels inside one and is unwrapped here.
    pub fn from_io(err: io::Error) -> Self {
        match err.get_ref().map(|inner| inner.is::<ArchiveError>()) {
            Some(true) => match err.into_inner().map(|inner| inner.downcast::<ArchiveError>()) {
                Some(Ok(inner)) => *inner,
                _ => Self::invalid_data("unreadable entry data"),
            },
            _ => Self::Io(err),
        }
    }

    /// Whether this error came from parsing a malformed structure.
    ///
    /// Bad magic, reserved bits, unknown methods and headers cut short by the
    /// end of the stream all count. Callers that scan for headers
    /// heuristically use this to tell a false-positive match from a real I/O
    /// failure.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::InvalidMagic { .. }
            | Self::UnsupportedMethod { .. }
            | Self::InvalidHeader { .. } => true,
            Self::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

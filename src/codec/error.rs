//! Error types for the frame codec.
//!
//! Every codec error is fatal to the connection that produced it: once a
//! length header is corrupt or a frame is truncated the stream can no longer
//! be resynchronised.
//!
//! - [`FramingError`]: the length header or payload violates the wire format.
//! - [`EofError`]: the stream ended inside a header or a payload.
//! - [`CodecError`]: top-level enum wrapping both plus transport I/O errors.

use std::io;

use thiserror::Error;

/// Violations of the length-prefixed wire format.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The length header decodes to a negative 32-bit integer.
    #[error("corrupt frame: negative length {length}")]
    NegativeLength {
        /// Raw value of the length header.
        length: i32,
    },

    /// The frame is larger than the configured (or representable) maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Size announced by the header or carried by the payload.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// The payload bytes are not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8,
}

/// The stream ended before a complete frame was observed.
///
/// A clean close at a frame boundary is not an error; decoders report it as
/// `Ok(None)`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The stream ended part way through the 4-byte length header.
    #[error("connection closed mid-header: received {bytes_received} of {header_size} bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// The stream ended part way through the payload.
    #[error("connection closed mid-frame: received {bytes_received} of {expected} bytes")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload length announced by the header.
        expected: usize,
    },
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Wire format violation.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Truncated frame.
    #[error("unexpected end of stream: {0}")]
    Eof(#[from] EofError),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Returns true if the stream ended part way through a frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolwire::codec::{CodecError, EofError};
    ///
    /// let err = CodecError::Eof(EofError::MidFrame {
    ///     bytes_received: 3,
    ///     expected: 10,
    /// });
    /// assert!(err.is_truncation());
    /// ```
    #[must_use]
    pub fn is_truncation(&self) -> bool { matches!(self, Self::Eof(_)) }

    /// Returns the error category as a string for logging and metrics.
    ///
    /// One of `"framing"`, `"eof"` or `"io"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Eof(_) => "eof",
            Self::Io(_) => "io",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}

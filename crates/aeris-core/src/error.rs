//! Error types shared by the serial sensor drivers.

use thiserror_no_std::Error;

/// Failure modes of a single framed read from a sensor UART.
///
/// A full queue is deliberately *not* represented here: dropping an event or a
/// log line is a reporting concern, not a read failure, and is surfaced by the
/// queue APIs returning `false` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The sensor produced no bytes at all within the polling budget.
    #[error("sensor produced no data within the polling budget")]
    NoResponse,

    /// A frame started to arrive but ended short of the expected length.
    #[error("incomplete frame: got {got} of {wanted} bytes")]
    Incomplete {
        /// Bytes actually received, including any start bytes.
        got: usize,
        /// Total frame length that was expected.
        wanted: usize,
    },

    /// The frame arrived in full but its checksum did not match.
    #[error("checksum mismatch: received {got:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        /// Checksum carried inside the frame.
        got: u16,
        /// Checksum computed over the received bytes.
        computed: u16,
    },

    /// A length-prefixed frame advertised a payload size we do not understand.
    #[error("unexpected frame length {len}")]
    UnexpectedLength {
        /// Advertised payload length in bytes.
        len: usize,
    },

    /// A response frame echoed a command byte no request ever used.
    #[error("unknown command echo {cmd:#04x}")]
    UnknownCommandEcho {
        /// The echoed command byte.
        cmd: u8,
    },

    /// The underlying stream failed.
    #[error("stream error: {0:?}")]
    Io(embedded_io::ErrorKind),
}

impl ReadError {
    /// Converts any [`embedded_io::Error`] into the portable [`ReadError::Io`]
    /// variant so driver code can stay generic over the stream's error type.
    pub(crate) fn io<E: embedded_io::Error>(err: E) -> Self {
        Self::Io(err.kind())
    }
}

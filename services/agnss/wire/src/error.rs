//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer shorter than the 8-byte frame overhead
    #[error("frame too short")]
    TooShort,

    /// First two bytes are not 0xB5 0x62
    #[error("bad sync bytes")]
    BadSyncBytes,

    /// Declared payload length runs past the end of the buffer
    #[error("payload too short")]
    PayloadTooShort,

    /// Trailing checksum does not match the frame contents
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Bytes left over after a frame where exactly one was expected
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// Empty payload part passed to the frame builder
    #[error("invalid payload entry")]
    InvalidEntry,

    /// Payload does not fit the 16-bit length field
    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),

    /// Message recognised but the requested operation is not supported for it
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Field value outside the range the message can carry
    #[error("{0} out of range")]
    OutOfRange(&'static str),

    /// Unknown value for a wire enumeration
    #[error("unknown code {0}")]
    Code(u8),
}

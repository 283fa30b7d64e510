//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Reasons a byte sequence does not decode to a [`Value`](crate::Value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes available than the tag declares.
    #[error("unexpected end of buffer: needed {needed} bytes at offset {offset}")]
    UnexpectedEnd { offset: usize, needed: usize },

    /// Tag byte outside the supported subset.
    #[error("unsupported tag byte 0x{0:02x}")]
    UnsupportedTag(u8),

    /// A map key decoded to something other than a string.
    #[error("map key must be a string")]
    NonStringMapKey,

    /// String payload is not UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// Arrays and maps nested too deeply.
    #[error("nesting exceeds {max} levels")]
    DepthExceeded { max: usize },
}

/// Errors raised while framing, decoding or exchanging messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared or produced frame exceeds the maximum size.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: u32 },

    /// Frame body is not a valid encoded value.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Frame body holds more than one value.
    #[error("unexpected trailing bytes: {remaining} after the top-level value")]
    TrailingBytes { remaining: usize },

    /// Frame decoded, but its root is not a map.
    #[error("frame root must be map")]
    RootNotMap,

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream ended in the middle of a frame.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// Operation timed out.
    #[error("timeout during {operation}")]
    Timeout { operation: String },
}

impl ProtocolError {
    /// Returns true when the connection cannot continue after this error.
    ///
    /// Per-frame decode failures are answered and the stream stays usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FrameTooLarge { .. }
                | Self::Io(_)
                | Self::IncompleteFrame { .. }
                | Self::Timeout { .. }
        )
    }
}

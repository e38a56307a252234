//! NetDAQ codec and framing error types

use thiserror::Error;

/// Errors produced while framing packets or encoding/decoding payloads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Packet did not start with the `FELX` marker
    #[error("invalid magic: expected 0x46454C58 (\"FELX\"), got {found:#010x}")]
    BadMagic {
        /// Marker found on the wire
        found: u32,
    },

    /// Header total length is smaller than the header itself
    #[error("invalid total length {total_length} (header alone is {min} bytes)")]
    InvalidLength {
        /// Length field from the header
        total_length: u32,
        /// Minimum valid value
        min: usize,
    },

    /// Packet exceeds the framer's configured maximum
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Declared packet size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Framer was fed after a fatal framing error
    #[error("stream is desynchronised and can no longer be parsed")]
    Desynchronized,

    /// Fewer bytes were available than the structure needs
    #[error("truncated {structure}: need {needed} bytes, got {got}")]
    TruncatedInput {
        /// Structure being decoded
        structure: &'static str,
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// Payload length does not match the command's fixed shape
    #[error("unexpected payload length for {command}: expected {expected} bytes, got {got}")]
    UnexpectedPayloadLength {
        /// Command name
        command: &'static str,
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },

    /// Enumerated field holds a code outside the known table
    #[error("unknown {field} code {code:#x}")]
    UnknownEnumCode {
        /// Field being decoded
        field: &'static str,
        /// Raw code
        code: u32,
    },

    /// Encoded structure would not have its mandatory size
    #[error("{structure} encodes to {got} bytes, must be exactly {expected}")]
    EncodedSizeMismatch {
        /// Structure being encoded
        structure: &'static str,
        /// Required size
        expected: usize,
        /// Produced size
        got: usize,
    },

    /// Equation programs do not fit in the config block trailer
    #[error("equation for channel {channel} spans {start}..{end}, trailer holds {capacity} bytes")]
    TrailerOverflow {
        /// Owning channel (1-based)
        channel: u8,
        /// Program start offset
        start: usize,
        /// Program end offset
        end: usize,
        /// Trailer capacity
        capacity: usize,
    },

    /// Two equation programs occupy overlapping trailer bytes
    #[error("equations for channels {first} and {second} overlap in the trailer")]
    TrailerOverlap {
        /// First channel (1-based)
        first: u8,
        /// Second channel (1-based)
        second: u8,
    },

    /// Channel number outside 1..=30
    #[error("channel {0} out of range (1..=30)")]
    InvalidChannel(u32),

    /// Channel settings outside the instrument's documented limits
    #[error("invalid channel {channel} configuration: {reason}")]
    InvalidChannelConfig {
        /// Channel (1-based)
        channel: u8,
        /// Which limit was violated
        reason: &'static str,
    },

    /// Readings chunk length is shorter than its fixed part
    #[error("invalid reading chunk length {0} (minimum 28)")]
    InvalidChunkLength(u32),
}

impl Error {
    /// Whether this error leaves the byte stream unparseable.
    ///
    /// Only framing failures are fatal to the connection; everything else is
    /// scoped to the packet or channel that produced it.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::BadMagic { .. }
                | Self::InvalidLength { .. }
                | Self::PacketTooLarge { .. }
                | Self::Desynchronized
        )
    }

    pub(crate) const fn truncated(structure: &'static str, needed: usize, got: usize) -> Self {
        Self::TruncatedInput {
            structure,
            needed,
            got,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! Start request payload

use bytes::BufMut;

use super::{TIMESTAMP_SIZE, Timestamp, ensure_len};
use crate::protocol::Result;

/// Size of the start request payload
pub const START_REQUEST_SIZE: usize = 16;

/// Payload of [`Command::Start`](crate::Command::Start)
///
/// ```text
/// [start time (8, short timestamp)] [reserved (8)]
/// ```
///
/// An all-zero payload starts scanning immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StartRequest {
    /// When scanning should begin
    pub start_at: Timestamp,
    /// Unknown trailing bytes
    pub reserved: [u8; 8],
}

impl Default for StartRequest {
    fn default() -> Self {
        Self::immediate()
    }
}

impl StartRequest {
    /// Start as soon as the instrument receives the request
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            start_at: Timestamp::zero(),
            reserved: [0; 8],
        }
    }

    /// Start at the given instrument time
    #[must_use]
    pub const fn at(start_at: Timestamp) -> Self {
        Self {
            start_at,
            reserved: [0; 8],
        }
    }

    /// Whether this request means "start now"
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.start_at == Timestamp::zero()
    }

    /// Parse from the first 16 bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, START_REQUEST_SIZE, "start request")?;
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&bytes[TIMESTAMP_SIZE..START_REQUEST_SIZE]);
        Ok(Self {
            start_at: Timestamp::decode(bytes)?,
            reserved,
        })
    }

    /// Write the 16-byte form to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        self.start_at.encode_into(dst);
        dst.put_slice(&self.reserved);
    }

    /// Convert to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; START_REQUEST_SIZE] {
        let mut bytes = [0u8; START_REQUEST_SIZE];
        self.encode_into(&mut &mut bytes[..]);
        bytes
    }
}

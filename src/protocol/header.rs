//! NetDAQ packet header
//!
//! Every packet in either direction starts with the same 16 bytes.

use bytes::{Buf, BufMut};

use super::{Error, HEADER_SIZE, MAGIC, Result};

/// NetDAQ packet header (16 bytes, big-endian)
///
/// # Wire Format
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Magic "FELX" (4)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     Sequence ID (4)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Command ID (4)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             Total Length incl. header (4)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    sequence_id: u32,
    command_id: u32,
    total_length: u32,
}

impl PacketHeader {
    /// Create a header for a payload of `payload_len` bytes
    #[must_use]
    pub fn new(sequence_id: u32, command_id: u32, payload_len: usize) -> Self {
        Self {
            sequence_id,
            command_id,
            total_length: u32::try_from(HEADER_SIZE + payload_len).unwrap_or(u32::MAX),
        }
    }

    /// Get sequence ID
    #[must_use]
    pub const fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    /// Get command ID
    #[must_use]
    pub const fn command_id(&self) -> u32 {
        self.command_id
    }

    /// Get total packet length, header included
    #[must_use]
    pub const fn total_length(&self) -> u32 {
        self.total_length
    }

    /// Payload length implied by the total length
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Write the header to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        dst.put_slice(&MAGIC);
        dst.put_u32(self.sequence_id);
        dst.put_u32(self.command_id);
        dst.put_u32(self.total_length);
    }

    /// Convert to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        self.encode_into(&mut &mut bytes[..]);
        bytes
    }

    /// Parse and validate a header from the first 16 bytes of `bytes`
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::truncated("packet header", HEADER_SIZE, bytes.len()));
        }

        let magic = bytes.get_u32();
        if magic != u32::from_be_bytes(MAGIC) {
            return Err(Error::BadMagic { found: magic });
        }

        let header = Self {
            sequence_id: bytes.get_u32(),
            command_id: bytes.get_u32(),
            total_length: bytes.get_u32(),
        };

        if (header.total_length as usize) < HEADER_SIZE {
            return Err(Error::InvalidLength {
                total_length: header.total_length,
                min: HEADER_SIZE,
            });
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = PacketHeader::new(7, 0x81, 2492);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"FELX");

        let decoded = PacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.total_length(), 2508);
        assert_eq!(decoded.payload_len(), 2492);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = PacketHeader::new(1, 0, 0).to_bytes();
        bytes[0..4].copy_from_slice(&0xDEAD_BEEF_u32.to_be_bytes());

        let result = PacketHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(Error::BadMagic { found: 0xDEAD_BEEF })));
    }

    #[test]
    fn test_length_below_header_size() {
        let mut bytes = PacketHeader::new(1, 0, 0).to_bytes();
        bytes[12..16].copy_from_slice(&8u32.to_be_bytes());

        let result = PacketHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(Error::InvalidLength { total_length: 8, .. })));
    }

    #[test]
    fn test_short_buffer() {
        let result = PacketHeader::from_bytes(b"FELX\0\0");
        assert!(matches!(result, Err(Error::TruncatedInput { needed: 16, got: 6, .. })));
    }
}

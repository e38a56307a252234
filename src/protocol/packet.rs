//! NetDAQ packet implementation

use bytes::{Bytes, BytesMut};

use super::{ERROR_COMMAND_ID, Error, HEADER_SIZE, PacketHeader, Result};
use crate::protocol::command::{Command, Lookup, lookup};

/// A complete NetDAQ packet
///
/// Packets are immutable once built; the total length is always derived
/// from the payload so the header can never disagree with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    sequence_id: u32,
    command_id: u32,
    payload: Bytes,
}

impl Packet {
    /// Create a new packet
    pub fn new(sequence_id: u32, command_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_id,
            command_id,
            payload: payload.into(),
        }
    }

    /// Create a request packet for a known command
    pub fn request(sequence_id: u32, command: Command, payload: impl Into<Bytes>) -> Self {
        Self::new(sequence_id, command.as_u32(), payload)
    }

    /// Create an instrument error response
    #[must_use]
    pub fn error_response(sequence_id: u32, code: u32) -> Self {
        Self::new(sequence_id, ERROR_COMMAND_ID, code.to_be_bytes().to_vec())
    }

    pub(crate) fn from_parts(header: PacketHeader, payload: Bytes) -> Self {
        Self::new(header.sequence_id(), header.command_id(), payload)
    }

    /// Get sequence ID
    #[must_use]
    pub const fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    /// Get raw command ID
    #[must_use]
    pub const fn command_id(&self) -> u32 {
        self.command_id
    }

    /// Resolve the command ID against the registry
    #[must_use]
    pub fn command(&self) -> Lookup {
        lookup(self.command_id)
    }

    /// Get payload
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total length as carried in the header
    #[must_use]
    pub fn total_length(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Build the header describing this packet
    #[must_use]
    pub fn header(&self) -> PacketHeader {
        PacketHeader::new(self.sequence_id, self.command_id, self.payload.len())
    }

    /// Whether this is an instrument error response
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.command_id == ERROR_COMMAND_ID
    }

    /// Error code carried by an error response
    ///
    /// Returns `Ok(None)` for ordinary packets.
    pub fn error_code(&self) -> Result<Option<u32>> {
        if !self.is_error() {
            return Ok(None);
        }
        let bytes: [u8; 4] = self.payload.as_ref().try_into().map_err(|_| {
            Error::UnexpectedPayloadLength {
                command: "ErrorResponse",
                expected: 4,
                got: self.payload.len(),
            }
        })?;
        Ok(Some(u32::from_be_bytes(bytes)))
    }

    /// Encode packet to bytes
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(self.total_length());
        super::encode_packet(self, &mut dst);
        dst
    }

    /// Decode exactly one packet from a complete buffer
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::from_bytes(bytes)?;
        let total = header.total_length() as usize;
        if bytes.len() < total {
            return Err(Error::truncated("packet", total, bytes.len()));
        }
        Ok(Self::from_parts(
            header,
            Bytes::copy_from_slice(&bytes[HEADER_SIZE..total]),
        ))
    }
}

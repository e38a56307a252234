//! NetDAQ packet framing
//!
//! Turns an unbounded byte stream into whole [`Packet`]s and frames outgoing
//! packets. The framer holds one buffer per connection and is driven through
//! `&mut self`, so callers feed it from a single reader task.

use std::io::{ErrorKind, Read};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{instrument, trace, warn};

use super::{Error, HEADER_SIZE, Packet, PacketHeader, Result};

/// Default maximum packet size (1 MiB), far above anything the instrument sends
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Framer configuration options.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FramerConfig {
    /// Largest total packet length (header included) accepted from the wire.
    pub max_packet_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

/// Decoder state between reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Fewer than 16 bytes of the next packet are buffered
    AwaitingHeader,
    /// Header parsed, waiting for the rest of the payload
    AwaitingPayload {
        /// Parsed header
        header: PacketHeader,
        /// Payload bytes still missing
        remaining: usize,
    },
    /// A framing error occurred; no resynchronisation is attempted
    Desynchronized,
}

/// Incremental packet decoder for one connection
#[derive(Debug)]
pub struct PacketFramer {
    buf: BytesMut,
    state: FramerState,
    config: FramerConfig,
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFramer {
    /// Create a framer with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    /// Create a framer with explicit configuration
    #[must_use]
    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: FramerState::AwaitingHeader,
            config,
        }
    }

    /// Current decoder state
    #[must_use]
    pub const fn state(&self) -> FramerState {
        self.state
    }

    /// Number of bytes buffered but not yet emitted as packets
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Append bytes read from the transport
    pub fn feed(&mut self, data: &[u8]) {
        trace!(len = data.len(), buffered = self.buf.len(), "framer input");
        self.buf.extend_from_slice(data);
    }

    /// Feed bytes and collect every packet they complete, in order
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.feed(data);
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Extract the next complete packet, if one is buffered
    ///
    /// Returns `Ok(None)` when more bytes are needed. A framing error leaves
    /// the framer desynchronised; every later call fails.
    #[instrument(level = "trace", skip(self))]
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            match self.state {
                FramerState::Desynchronized => return Err(Error::Desynchronized),
                FramerState::AwaitingHeader => {
                    if self.buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }
                    let header = match self.parse_header() {
                        Ok(header) => header,
                        Err(err) => {
                            warn!(error = %err, "framing error, stream desynchronised");
                            self.state = FramerState::Desynchronized;
                            return Err(err);
                        }
                    };
                    self.buf.advance(HEADER_SIZE);
                    self.state = FramerState::AwaitingPayload {
                        header,
                        remaining: header.payload_len(),
                    };
                }
                FramerState::AwaitingPayload { header, .. } => {
                    let payload_len = header.payload_len();
                    if self.buf.len() < payload_len {
                        self.state = FramerState::AwaitingPayload {
                            header,
                            remaining: payload_len - self.buf.len(),
                        };
                        return Ok(None);
                    }

                    let payload = self.buf.split_to(payload_len).freeze();
                    self.state = FramerState::AwaitingHeader;
                    trace!(
                        sequence_id = header.sequence_id(),
                        command_id = header.command_id(),
                        payload_len,
                        "packet complete"
                    );
                    return Ok(Some(Packet::from_parts(header, payload)));
                }
            }
        }
    }

    fn parse_header(&self) -> Result<PacketHeader> {
        let header = PacketHeader::from_bytes(&self.buf[..HEADER_SIZE])?;
        let size = header.total_length() as usize;
        if size > self.config.max_packet_size {
            return Err(Error::PacketTooLarge {
                size,
                max: self.config.max_packet_size,
            });
        }
        Ok(header)
    }
}

/// Encode a packet into the wire format
///
/// # Format
///
/// ```text
/// ["FELX"] [SEQUENCE (4)] [COMMAND (4)] [TOTAL LENGTH (4)] [PAYLOAD (variable)]
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) {
    dst.reserve(packet.total_length());
    packet.header().encode_into(dst);
    dst.put_slice(packet.payload());
}

/// Frame a command and payload directly into `dst`
pub fn frame(sequence_id: u32, command_id: u32, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    PacketHeader::new(sequence_id, command_id, payload.len()).encode_into(dst);
    dst.put_slice(payload);
}

/// Errors from [`PacketReader`]
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Framing failure
    #[error(transparent)]
    Protocol(#[from] Error),

    /// I/O failure on the underlying stream
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly between packets
    #[error("connection closed")]
    Eof,

    /// The stream ended partway through a packet
    #[error("connection closed mid-packet with {buffered} bytes pending")]
    ConnectionClosedMidPacket {
        /// Bytes of the unfinished packet already received
        buffered: usize,
    },
}

/// Reads complete packets from any `Read` stream
pub struct PacketReader<T> {
    inner: T,
    framer: PacketFramer,
}

impl<T: Read> PacketReader<T> {
    /// Create a reader with default framer configuration
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FramerConfig::default())
    }

    /// Create a reader with explicit framer configuration
    pub fn with_config(inner: T, config: FramerConfig) -> Self {
        Self {
            inner,
            framer: PacketFramer::with_config(config),
        }
    }

    /// Read the next complete packet (blocking)
    pub fn read_packet(&mut self) -> std::result::Result<Packet, ReadError> {
        loop {
            if let Some(packet) = self.framer.next_packet()? {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ReadError::Io(err)),
            };

            if read == 0 {
                let buffered = self.framer.buffered();
                if buffered == 0 && self.framer.state() == FramerState::AwaitingHeader {
                    return Err(ReadError::Eof);
                }
                return Err(ReadError::ConnectionClosedMidPacket { buffered });
            }

            self.framer.feed(&chunk[..read]);
        }
    }

    /// Consume the reader and return the inner stream
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::protocol::MAGIC;

    fn wire(sequence_id: u32, command_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut dst = BytesMut::new();
        frame(sequence_id, command_id, payload, &mut dst);
        dst.to_vec()
    }

    #[test]
    fn test_header_then_payload_in_three_chunks() {
        let payload: Vec<u8> = (0u8..40).collect();
        let bytes = wire(5, 0x64, &payload);
        let mut framer = PacketFramer::new();

        assert!(framer.push(&bytes[..HEADER_SIZE]).unwrap().is_empty());
        assert!(matches!(
            framer.state(),
            FramerState::AwaitingPayload { remaining: 40, .. }
        ));
        assert!(framer.push(&bytes[16..19]).unwrap().is_empty());
        assert!(framer.push(&bytes[19..50]).unwrap().is_empty());
        assert!(matches!(
            framer.state(),
            FramerState::AwaitingPayload { remaining: 6, .. }
        ));

        let packets = framer.push(&bytes[50..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].sequence_id(), 5);
        assert_eq!(packets[0].payload().as_ref(), payload.as_slice());
        assert_eq!(framer.state(), FramerState::AwaitingHeader);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_two_packets_in_one_read() {
        let mut bytes = wire(1, 0x00, b"");
        bytes.extend(wire(2, 0x72, b"abc\0"));
        let mut framer = PacketFramer::new();

        let packets = framer.push(&bytes).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].sequence_id(), 1);
        assert!(packets[0].payload().is_empty());
        assert_eq!(packets[1].sequence_id(), 2);
        assert_eq!(packets[1].payload().as_ref(), b"abc\0");
    }

    #[test]
    fn test_trailing_partial_packet_is_kept() {
        let mut bytes = wire(1, 0x02, &[0, 0, 0, 0]);
        let second = wire(2, 0x02, &[0x80, 0, 0, 0]);
        bytes.extend_from_slice(&second[..10]);

        let mut framer = PacketFramer::new();
        assert_eq!(framer.push(&bytes).unwrap().len(), 1);
        assert_eq!(framer.buffered(), 10);

        let packets = framer.push(&second[10..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload().as_ref(), &[0x80, 0, 0, 0]);
    }

    #[test]
    fn test_bad_magic_poisons_framer() {
        let mut bytes = wire(1, 0, b"");
        bytes[0] = b'X';
        let mut framer = PacketFramer::new();

        assert!(matches!(framer.push(&bytes), Err(Error::BadMagic { .. })));
        assert_eq!(framer.state(), FramerState::Desynchronized);
        assert!(matches!(
            framer.push(&wire(2, 0, b"")),
            Err(Error::Desynchronized)
        ));
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let mut framer = PacketFramer::with_config(FramerConfig {
            max_packet_size: 64,
        });
        let result = framer.push(&wire(1, 0x64, &[0u8; 100]));
        assert!(matches!(
            result,
            Err(Error::PacketTooLarge { size: 116, max: 64 })
        ));
    }

    #[test]
    fn test_length_below_header_is_fatal() {
        let mut bytes = BytesMut::new();
        bytes.put_slice(&MAGIC);
        bytes.put_u32(3);
        bytes.put_u32(0);
        bytes.put_u32(4);
        bytes.put_slice(&wire(4, 0, b""));

        let mut framer = PacketFramer::new();
        let err = framer.push(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidLength { total_length: 4, .. }));
        assert!(err.is_connection_fatal());
        assert_eq!(framer.state(), FramerState::Desynchronized);
    }

    #[test]
    fn test_header_only_packet() {
        let mut bytes = BytesMut::new();
        bytes.put_slice(&MAGIC);
        bytes.put_u32(3);
        bytes.put_u32(0);
        bytes.put_u32(16);

        let mut framer = PacketFramer::new();
        let packets = framer.push(&bytes).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].total_length(), HEADER_SIZE);
    }

    #[test]
    fn test_reader_handles_byte_by_byte_stream() {
        struct Trickle(Vec<u8>, usize);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.1 >= self.0.len() {
                    return Ok(0);
                }
                buf[0] = self.0[self.1];
                self.1 += 1;
                Ok(1)
            }
        }

        let mut reader = PacketReader::new(Trickle(wire(4, 0x6F, b"slow"), 0));
        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.sequence_id(), 4);
        assert_eq!(packet.payload().as_ref(), b"slow");
        assert!(matches!(reader.read_packet(), Err(ReadError::Eof)));
    }

    #[test]
    fn test_reader_closed_mid_packet() {
        let bytes = wire(4, 0x6F, b"truncated");
        let mut reader = PacketReader::new(Cursor::new(bytes[..20].to_vec()));
        assert!(matches!(
            reader.read_packet(),
            Err(ReadError::ConnectionClosedMidPacket { .. })
        ));

        let mut reader = PacketReader::new(Cursor::new(bytes[..9].to_vec()));
        assert!(matches!(
            reader.read_packet(),
            Err(ReadError::ConnectionClosedMidPacket { buffered: 9 })
        ));
    }
}

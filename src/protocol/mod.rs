//! NetDAQ wire protocol
//!
//! This module provides the packet header, the stream framer, the command
//! registry and the typed request/response payloads.

pub mod command;
mod error;
pub mod framer;
mod header;
mod packet;
pub mod payload;

pub use command::{COMMANDS, Command, CommandDescriptor, Lookup, PayloadShape, lookup};
pub use error::{Error, Result};
pub use framer::{
    DEFAULT_MAX_PACKET_SIZE, FramerConfig, FramerState, PacketFramer, PacketReader, ReadError,
    encode_packet, frame,
};
pub use header::PacketHeader;
pub use packet::Packet;
pub use payload::{DEFAULT_MAX_READINGS, Request, Response};

/// Packet marker: "FELX" in ASCII
pub const MAGIC: [u8; 4] = *b"FELX";

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Command ID carried by instrument error responses
pub const ERROR_COMMAND_ID: u32 = 0xFFFF_FFFF;

/// Default TCP port of the instrument
pub const DEFAULT_PORT: u16 = 4369;

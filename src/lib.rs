//! NetDAQ - client-side protocol engine for networked data-acquisition instruments
//!
//! This library implements the binary request/response protocol spoken by
//! the NetDAQ family of scanning loggers. It frames and de-frames packets,
//! encodes and decodes every documented payload, interprets the
//! computed-channel equation bytecode and correlates responses with
//! requests. Sockets are left to the caller.
//!
//! # Quick Start
//!
//! ```rust
//! use netdaq::codec::{ChannelConfig, ChannelId, ChannelKind, ConfigBlock, VdcRange};
//! use netdaq::{Correlator, Request, equation};
//!
//! let mut config = ConfigBlock::new();
//! config.set_channel(
//!     ChannelId::new(1)?,
//!     ChannelConfig::new(ChannelKind::Vdc { range: VdcRange::V3 }),
//! )?;
//! config.push_equation(ChannelId::new(21)?, equation::compile("C1 * 1000")?)?;
//!
//! let mut correlator = Correlator::new();
//! let outgoing = correlator.send(&Request::SetConfig(Box::new(config)))?;
//! assert_eq!(outgoing.bytes.len(), 2508);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Layout
//!
//! - [`protocol`] - packet header, stream framer, command registry, typed payloads
//! - [`codec`] - fixed-layout structures: timestamps, config block, readings
//! - [`equation`] - equation bytecode, evaluator and infix compiler
//! - [`session`] - sequence IDs and response matching
//!
//! All multi-byte fields are big-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod codec;
pub mod equation;
pub mod protocol;
pub mod session;

pub use protocol::{
    Command, DEFAULT_PORT, ERROR_COMMAND_ID, Error, HEADER_SIZE, Lookup, MAGIC, Packet,
    PacketFramer, PacketReader, Request, Response, Result, lookup,
};
pub use session::{Correlator, Delivery, SessionError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

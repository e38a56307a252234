//! Request/response correlation for one instrument connection
//!
//! The instrument answers one request at a time and echoes the request's
//! sequence ID; success responses carry command ID 0. [`Correlator`] hands out
//! sequence IDs, enforces the single outstanding request and turns incoming
//! packets into typed [`Response`](crate::Response)s or [`SessionError`]s.
//!
//! Transport I/O stays with the caller:
//!
//! ```rust
//! use netdaq::{Correlator, Delivery, Packet, PacketFramer, Request, Response};
//!
//! let mut correlator = Correlator::new();
//! let mut framer = PacketFramer::new();
//!
//! let outgoing = correlator.send(&Request::Ping)?;
//! // write `outgoing.bytes` to the socket ...
//!
//! // ... and feed whatever comes back
//! let reply = Packet::new(outgoing.sequence_id, 0, Vec::new()).encode();
//! for packet in framer.push(&reply)? {
//!     let delivery = correlator.on_packet(&packet)?;
//!     assert!(matches!(delivery, Delivery::Response { response: Response::Ack, .. }));
//! }
//! # Ok::<(), netdaq::SessionError>(())
//! ```

mod correlator;
mod error;

pub use correlator::{
    Correlator, CorrelatorConfig, Delivery, FIRST_SEQUENCE_ID, OutgoingRequest, PendingRequest,
};
pub use error::{Result, SessionError};

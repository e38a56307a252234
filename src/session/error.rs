//! Session error types

use thiserror::Error;

use crate::protocol::Error as ProtocolError;

/// Failures while exchanging requests and responses
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A request is already waiting for its response
    #[error("request {sequence_id} is still in flight")]
    RequestInFlight {
        /// Sequence ID of the outstanding request
        sequence_id: u32,
    },

    /// The connection is gone; nothing can be sent or received
    #[error("session is disconnected")]
    Disconnected,

    /// Response whose sequence ID matches no request
    #[error("unsolicited response {sequence_id} (command {command_id:#010x})")]
    UnsolicitedResponse {
        /// Sequence ID on the packet
        sequence_id: u32,
        /// Command ID on the packet
        command_id: u32,
    },

    /// The instrument rejected the request
    #[error("instrument error {code:#010x} for request {sequence_id}")]
    InstrumentError {
        /// Sequence ID of the failed request
        sequence_id: u32,
        /// Error code reported by the instrument
        code: u32,
    },

    /// The response could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether the connection can no longer be used
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        match self {
            Self::Disconnected => true,
            Self::Protocol(err) => err.is_connection_fatal(),
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SessionError>;

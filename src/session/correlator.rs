//! Request/response correlation

use std::collections::VecDeque;

use bytes::BytesMut;
use tracing::{debug, instrument, trace, warn};

use super::error::{Result, SessionError};
use crate::protocol::{ERROR_COMMAND_ID, Packet, Request, Response, frame, lookup};

/// First sequence ID used on a new session
pub const FIRST_SEQUENCE_ID: u32 = 2;

/// Correlator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelatorConfig {
    /// Sequence ID of the first request
    pub first_sequence_id: u32,
    /// How many abandoned requests are remembered for discarding late
    /// responses
    pub abandoned_capacity: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            first_sequence_id: FIRST_SEQUENCE_ID,
            abandoned_capacity: 16,
        }
    }
}

/// A request that has been sent and not yet answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingRequest {
    /// Sequence ID on the wire
    pub sequence_id: u32,
    /// Command the response will be decoded for
    pub command_id: u32,
}

/// A framed request ready to be written to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    /// Allocated sequence ID
    pub sequence_id: u32,
    /// Command ID
    pub command_id: u32,
    /// Complete packet bytes
    pub bytes: BytesMut,
}

/// Outcome of a packet handed to [`Correlator::on_packet`]
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Response to the outstanding request
    Response {
        /// Sequence ID of the request
        sequence_id: u32,
        /// Command of the request
        command_id: u32,
        /// Decoded payload
        response: Response,
    },
    /// Late response to an abandoned request, dropped
    Discarded {
        /// Sequence ID of the abandoned request
        sequence_id: u32,
    },
}

/// Matches responses to requests on one connection
///
/// The instrument handles one request at a time, so the correlator allows a
/// single outstanding request. It does no I/O: [`send`](Self::send) returns
/// the bytes to write and [`on_packet`](Self::on_packet) takes packets
/// produced by a [`PacketFramer`](crate::protocol::PacketFramer).
#[derive(Debug, Clone)]
pub struct Correlator {
    config: CorrelatorConfig,
    next_sequence_id: u32,
    pending: Option<PendingRequest>,
    abandoned: VecDeque<PendingRequest>,
    connected: bool,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Create a correlator with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CorrelatorConfig::default())
    }

    /// Create a correlator with custom settings
    #[must_use]
    pub fn with_config(config: CorrelatorConfig) -> Self {
        Self {
            config,
            next_sequence_id: config.first_sequence_id,
            pending: None,
            abandoned: VecDeque::new(),
            connected: true,
        }
    }

    /// Active settings
    #[must_use]
    pub const fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// The outstanding request, if any
    #[must_use]
    pub const fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// Whether a new request may be sent
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.connected && self.pending.is_none()
    }

    /// Whether [`disconnect`](Self::disconnect) has been called
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Sequence ID the next request will use
    #[must_use]
    pub const fn next_sequence_id(&self) -> u32 {
        self.next_sequence_id
    }

    /// Allocate a sequence ID and frame `request`
    ///
    /// # Errors
    ///
    /// [`SessionError::RequestInFlight`] while a response is outstanding,
    /// [`SessionError::Disconnected`] after a disconnect, or a protocol
    /// error if the payload cannot be encoded.
    #[instrument(level = "debug", skip(self, request), fields(command = request.command_id()))]
    pub fn send(&mut self, request: &Request) -> Result<OutgoingRequest> {
        if !self.connected {
            return Err(SessionError::Disconnected);
        }
        if let Some(pending) = self.pending {
            return Err(SessionError::RequestInFlight {
                sequence_id: pending.sequence_id,
            });
        }

        let payload = request.encode_payload()?;
        let command_id = request.command_id();
        let sequence_id = self.allocate_sequence_id();

        let mut bytes = BytesMut::new();
        frame(sequence_id, command_id, &payload, &mut bytes);

        self.pending = Some(PendingRequest {
            sequence_id,
            command_id,
        });
        debug!(sequence_id, len = bytes.len(), "request sent");

        Ok(OutgoingRequest {
            sequence_id,
            command_id,
            bytes,
        })
    }

    fn allocate_sequence_id(&mut self) -> u32 {
        let mut id = self.next_sequence_id;
        // Skip IDs whose late responses would be taken for discards.
        while self.abandoned.iter().any(|a| a.sequence_id == id) {
            id = id.wrapping_add(1);
        }
        self.next_sequence_id = id.wrapping_add(1);
        id
    }

    /// Match an incoming packet
    ///
    /// The outstanding request is resolved whether the result is a
    /// response or an error, except for unsolicited packets which leave it
    /// untouched.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnsolicitedResponse`] for unknown sequence IDs,
    /// [`SessionError::InstrumentError`] when the instrument rejected the
    /// request, or a protocol error if the payload does not decode.
    #[instrument(
        level = "trace",
        skip(self, packet),
        fields(sequence_id = packet.sequence_id(), command_id = packet.command_id())
    )]
    pub fn on_packet(&mut self, packet: &Packet) -> Result<Delivery> {
        let sequence_id = packet.sequence_id();

        let Some(pending) = self.pending.filter(|p| p.sequence_id == sequence_id) else {
            if let Some(index) = self
                .abandoned
                .iter()
                .position(|a| a.sequence_id == sequence_id)
            {
                self.abandoned.remove(index);
                debug!(
                    sequence_id,
                    command = %packet.command(),
                    len = packet.payload().len(),
                    "discarding late response to abandoned request"
                );
                return Ok(Delivery::Discarded { sequence_id });
            }

            warn!(sequence_id, command = %packet.command(), "unsolicited response");
            return Err(SessionError::UnsolicitedResponse {
                sequence_id,
                command_id: packet.command_id(),
            });
        };
        self.pending = None;

        match packet.command_id() {
            0 => {}
            ERROR_COMMAND_ID => {
                let code = packet.error_code()?.unwrap_or_default();
                debug!(sequence_id, code, "instrument error");
                return Err(SessionError::InstrumentError { sequence_id, code });
            }
            code => {
                debug!(sequence_id, code, "instrument returned non-zero response code");
                return Err(SessionError::InstrumentError { sequence_id, code });
            }
        }

        let response = Response::decode(pending.command_id, packet.payload())?;
        trace!(sequence_id, command = %lookup(pending.command_id), "response delivered");

        Ok(Delivery::Response {
            sequence_id,
            command_id: pending.command_id,
            response,
        })
    }

    /// Give up on the outstanding request
    ///
    /// Its response, should it still arrive, is discarded instead of being
    /// reported as unsolicited. Returns the abandoned request.
    pub fn abandon(&mut self) -> Option<PendingRequest> {
        let pending = self.pending.take()?;
        if self.abandoned.len() >= self.config.abandoned_capacity.max(1) {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(pending);
        debug!(sequence_id = pending.sequence_id, "request abandoned");
        Some(pending)
    }

    /// Mark the connection as gone
    ///
    /// Returns the request that can no longer complete; its caller should
    /// see [`SessionError::Disconnected`]. Further sends fail until
    /// [`reconnect`](Self::reconnect).
    pub fn disconnect(&mut self) -> Option<PendingRequest> {
        self.connected = false;
        self.abandoned.clear();
        let failed = self.pending.take();
        if let Some(request) = failed {
            debug!(sequence_id = request.sequence_id, "pending request failed by disconnect");
        }
        failed
    }

    /// Accept requests again on a fresh connection
    ///
    /// Sequence IDs continue from where they were.
    pub fn reconnect(&mut self) {
        self.connected = true;
        self.pending = None;
        self.abandoned.clear();
    }
}

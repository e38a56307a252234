//! Typed request and response payloads
//!
//! [`Request`] encodes what the client sends; [`Response`] decodes what the
//! instrument answers, driven by the command of the request it answers
//! (success responses carry command ID 0, so the packet alone does not say
//! what it contains).

use bytes::{Buf, Bytes};

use super::command::{Command, CommandDescriptor, Lookup, PayloadShape, lookup};
use super::{Error, Result};
use crate::codec::{ConfigBlock, FullTimestamp, InstrumentStatus, ReadingsResponse, StartRequest, VersionInfo};

/// Readings requested per `GetReadings` call unless told otherwise
pub const DEFAULT_MAX_READINGS: u32 = 0xFF;

/// A request to the instrument
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Liveness check
    Ping,
    /// End the session
    Close,
    /// Query the status word
    StatusQuery,
    /// Fetch up to `max_readings` buffered scans
    GetReadings {
        /// Upper bound on readings returned
        max_readings: u32,
    },
    /// Reset the instrument
    Reset,
    /// Read the internal error log
    ReadInternalErrors,
    /// Start scanning
    Start(StartRequest),
    /// Stop scanning
    Stop,
    /// Read the clock
    GetTime,
    /// Set the clock
    SetTime(FullTimestamp),
    /// Read one channel while spying
    QuerySpy {
        /// Channel number
        channel: u32,
    },
    /// Reset the totalizer
    ClearTotalizer,
    /// Firmware version strings
    GetVersionInfo,
    /// Show a channel on the front panel
    SetMonitorChannel {
        /// Channel number
        channel: u32,
    },
    /// Clear the front-panel monitor channel
    ClearMonitorChannel,
    /// Base channel number
    GetBaseChannel,
    /// Enter spy mode
    EnableSpy,
    /// Leave spy mode
    DisableSpy,
    /// LC board version strings
    GetLcVersion,
    /// Read the configuration block
    GetConfig,
    /// Write the configuration block
    SetConfig(Box<ConfigBlock>),
    /// Any command, including undocumented ones, with a raw payload
    Raw {
        /// Command ID
        command_id: u32,
        /// Payload bytes
        payload: Bytes,
    },
}

impl Request {
    /// Wire command ID
    #[must_use]
    pub fn command_id(&self) -> u32 {
        match self {
            Self::Raw { command_id, .. } => *command_id,
            known => known.command().map_or(0, Command::as_u32),
        }
    }

    /// Registry command, `None` only for raw requests with unknown IDs
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Some(match self {
            Self::Ping => Command::Ping,
            Self::Close => Command::Close,
            Self::StatusQuery => Command::StatusQuery,
            Self::GetReadings { .. } => Command::GetReadings,
            Self::Reset => Command::Reset,
            Self::ReadInternalErrors => Command::ReadInternalErrors,
            Self::Start(_) => Command::Start,
            Self::Stop => Command::Stop,
            Self::GetTime => Command::GetTime,
            Self::SetTime(_) => Command::SetTime,
            Self::QuerySpy { .. } => Command::QuerySpy,
            Self::ClearTotalizer => Command::ClearTotalizer,
            Self::GetVersionInfo => Command::GetVersionInfo,
            Self::SetMonitorChannel { .. } => Command::SetMonitorChannel,
            Self::ClearMonitorChannel => Command::ClearMonitorChannel,
            Self::GetBaseChannel => Command::GetBaseChannel,
            Self::EnableSpy => Command::EnableSpy,
            Self::DisableSpy => Command::DisableSpy,
            Self::GetLcVersion => Command::GetLcVersion,
            Self::GetConfig => Command::GetConfig,
            Self::SetConfig(_) => Command::SetConfig,
            Self::Raw { command_id, .. } => return Command::from_u32(*command_id),
        })
    }

    /// Encode the payload
    pub fn encode_payload(&self) -> Result<Bytes> {
        Ok(match self {
            Self::GetReadings { max_readings } => word(*max_readings),
            Self::QuerySpy { channel } | Self::SetMonitorChannel { channel } => word(*channel),
            Self::Start(start) => Bytes::copy_from_slice(&start.to_bytes()),
            Self::SetTime(time) => Bytes::copy_from_slice(&time.to_bytes()),
            Self::SetConfig(config) => config.encode()?.freeze(),
            Self::Raw { payload, .. } => payload.clone(),
            _ => Bytes::new(),
        })
    }

    /// Decode a request, as an instrument would
    ///
    /// Unknown command IDs become [`Request::Raw`].
    pub fn decode(command_id: u32, payload: &[u8]) -> Result<Self> {
        let Lookup::Known(descriptor) = lookup(command_id) else {
            return Ok(Self::Raw {
                command_id,
                payload: Bytes::copy_from_slice(payload),
            });
        };
        check_shape(descriptor, descriptor.request, payload)?;

        Ok(match descriptor.command {
            Command::Ping => Self::Ping,
            Command::Close => Self::Close,
            Command::StatusQuery => Self::StatusQuery,
            Command::GetReadings => Self::GetReadings {
                max_readings: read_word(payload),
            },
            Command::Reset => Self::Reset,
            Command::ReadInternalErrors => Self::ReadInternalErrors,
            Command::Start => Self::Start(StartRequest::decode(payload)?),
            Command::Stop => Self::Stop,
            Command::GetTime => Self::GetTime,
            Command::SetTime => Self::SetTime(FullTimestamp::decode(payload)?),
            Command::QuerySpy => Self::QuerySpy {
                channel: read_word(payload),
            },
            Command::ClearTotalizer => Self::ClearTotalizer,
            Command::GetVersionInfo => Self::GetVersionInfo,
            Command::SetMonitorChannel => Self::SetMonitorChannel {
                channel: read_word(payload),
            },
            Command::ClearMonitorChannel => Self::ClearMonitorChannel,
            Command::GetBaseChannel => Self::GetBaseChannel,
            Command::EnableSpy => Self::EnableSpy,
            Command::DisableSpy => Self::DisableSpy,
            Command::GetLcVersion => Self::GetLcVersion,
            Command::GetConfig => Self::GetConfig,
            Command::SetConfig => Self::SetConfig(Box::new(ConfigBlock::decode_lenient(payload)?)),
        })
    }
}

/// A successful response, typed by the command it answers
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Acknowledgement without payload
    Ack,
    /// Status word
    Status(InstrumentStatus),
    /// Buffered scans
    Readings(ReadingsResponse),
    /// Internal error log, layout undocumented
    InternalErrors(Bytes),
    /// Instrument clock
    Time(FullTimestamp),
    /// Spy-channel value
    SpyValue(f32),
    /// Firmware version strings
    VersionInfo(VersionInfo),
    /// Base channel number
    BaseChannel(u32),
    /// LC board version strings
    LcVersion(VersionInfo),
    /// Configuration block
    Config(Box<ConfigBlock>),
    /// Payload of a command outside the registry
    Raw(Bytes),
}

impl Response {
    /// Decode the payload of a success response to `command_id`
    ///
    /// Unknown commands yield [`Response::Raw`]. Configuration blocks are
    /// decoded leniently so undocumented channel codes never reject an
    /// instrument's own configuration.
    pub fn decode(command_id: u32, payload: &[u8]) -> Result<Self> {
        let Lookup::Known(descriptor) = lookup(command_id) else {
            return Ok(Self::Raw(Bytes::copy_from_slice(payload)));
        };
        check_shape(descriptor, descriptor.response, payload)?;

        Ok(match descriptor.command {
            Command::StatusQuery => Self::Status(InstrumentStatus::decode(payload)?),
            Command::GetReadings => Self::Readings(ReadingsResponse::decode(payload)?),
            Command::ReadInternalErrors => Self::InternalErrors(Bytes::copy_from_slice(payload)),
            Command::GetTime => Self::Time(FullTimestamp::decode(payload)?),
            Command::QuerySpy => Self::SpyValue(f32::from_bits(read_word(payload))),
            Command::GetVersionInfo => Self::VersionInfo(VersionInfo::decode(payload)),
            Command::GetBaseChannel => Self::BaseChannel(read_word(payload)),
            Command::GetLcVersion => Self::LcVersion(VersionInfo::decode(payload)),
            Command::GetConfig => Self::Config(Box::new(ConfigBlock::decode_lenient(payload)?)),
            Command::Ping
            | Command::Close
            | Command::Reset
            | Command::Start
            | Command::Stop
            | Command::SetTime
            | Command::ClearTotalizer
            | Command::SetMonitorChannel
            | Command::ClearMonitorChannel
            | Command::EnableSpy
            | Command::DisableSpy
            | Command::SetConfig => Self::Ack,
        })
    }

    /// Encode the payload, as an instrument would
    pub fn encode_payload(&self) -> Result<Bytes> {
        Ok(match self {
            Self::Ack => Bytes::new(),
            Self::Status(status) => word(status.raw()),
            Self::Readings(readings) => readings.encode()?.freeze(),
            Self::InternalErrors(bytes) | Self::Raw(bytes) => bytes.clone(),
            Self::Time(time) => Bytes::copy_from_slice(&time.to_bytes()),
            Self::SpyValue(value) => word(value.to_bits()),
            Self::VersionInfo(info) | Self::LcVersion(info) => info.encode().freeze(),
            Self::BaseChannel(channel) => word(*channel),
            Self::Config(config) => config.encode()?.freeze(),
        })
    }
}

fn check_shape(descriptor: &CommandDescriptor, shape: PayloadShape, payload: &[u8]) -> Result<()> {
    match shape.expected_len() {
        Some(expected) if expected != payload.len() => Err(Error::UnexpectedPayloadLength {
            command: descriptor.name,
            expected,
            got: payload.len(),
        }),
        _ => Ok(()),
    }
}

fn word(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

/// First word of a payload whose length was already checked
fn read_word(mut payload: &[u8]) -> u32 {
    if payload.remaining() < 4 {
        return 0;
    }
    payload.get_u32()
}

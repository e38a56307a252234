//! NetDAQ command identifiers and the command registry

use std::fmt;

use crate::codec::{CONFIG_PAYLOAD_SIZE, FULL_TIMESTAMP_SIZE, START_REQUEST_SIZE};

/// Known NetDAQ commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Liveness check
    Ping = 0x0000_0000,
    /// Orderly close of the session
    Close = 0x0000_0001,
    /// Instrument status word (busy bit)
    StatusQuery = 0x0000_0002,

    /// Fetch buffered scan readings
    GetReadings = 0x0000_0064,
    /// Reset the instrument
    Reset = 0x0000_0065,
    /// Read the instrument's internal error log
    ReadInternalErrors = 0x0000_0066,
    /// Start scanning
    Start = 0x0000_0067,
    /// Stop scanning
    Stop = 0x0000_0068,
    /// Read the instrument clock
    GetTime = 0x0000_0069,
    /// Set the instrument clock
    SetTime = 0x0000_006A,
    /// Single spy-channel reading
    QuerySpy = 0x0000_006F,
    /// Reset the totalizer counter
    ClearTotalizer = 0x0000_0071,
    /// Firmware version strings
    GetVersionInfo = 0x0000_0072,
    /// Select the front-panel monitor channel
    SetMonitorChannel = 0x0000_0075,
    /// Clear the front-panel monitor channel
    ClearMonitorChannel = 0x0000_0076,
    /// Base channel number of the instrument
    GetBaseChannel = 0x0000_0077,
    /// Enable spy mode
    EnableSpy = 0x0000_007C,
    /// Disable spy mode
    DisableSpy = 0x0000_007D,
    /// LC board version strings
    GetLcVersion = 0x0000_007F,
    /// Read the configuration block
    GetConfig = 0x0000_0080,
    /// Write the configuration block
    SetConfig = 0x0000_0081,
}

/// Expected shape of a request or response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// No payload
    Empty,
    /// Exactly this many bytes
    Fixed(usize),
    /// Variable length with an explicit count prefix
    CountPrefixed,
    /// Unspecified layout, passed through as raw bytes
    Opaque,
}

impl PayloadShape {
    /// Fixed length implied by the shape, if any
    #[must_use]
    pub const fn expected_len(self) -> Option<usize> {
        match self {
            Self::Empty => Some(0),
            Self::Fixed(len) => Some(len),
            Self::CountPrefixed | Self::Opaque => None,
        }
    }
}

/// Static description of a command
#[derive(Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Command
    pub command: Command,
    /// Human readable name
    pub name: &'static str,
    /// Shape of the request payload
    pub request: PayloadShape,
    /// Shape of a successful response payload
    pub response: PayloadShape,
}

/// Result of a registry lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Command is in the registry
    Known(&'static CommandDescriptor),
    /// Command ID is not documented; the packet is still delivered as-is
    Unknown {
        /// Raw command ID
        command_id: u32,
    },
}

impl Lookup {
    /// Descriptor for known commands
    #[must_use]
    pub const fn descriptor(self) -> Option<&'static CommandDescriptor> {
        match self {
            Self::Known(descriptor) => Some(descriptor),
            Self::Unknown { .. } => None,
        }
    }
}

const fn entry(
    command: Command,
    name: &'static str,
    request: PayloadShape,
    response: PayloadShape,
) -> CommandDescriptor {
    CommandDescriptor {
        command,
        name,
        request,
        response,
    }
}

use PayloadShape::{CountPrefixed, Empty, Fixed, Opaque};

/// Process-wide command table, ordered by command ID
pub static COMMANDS: [CommandDescriptor; 21] = [
    entry(Command::Ping, "Ping", Empty, Empty),
    entry(Command::Close, "Close", Empty, Empty),
    entry(Command::StatusQuery, "StatusQuery", Empty, Fixed(4)),
    entry(Command::GetReadings, "GetReadings", Fixed(4), CountPrefixed),
    entry(Command::Reset, "Reset", Empty, Empty),
    entry(Command::ReadInternalErrors, "ReadInternalErrors", Empty, Opaque),
    entry(Command::Start, "Start", Fixed(START_REQUEST_SIZE), Empty),
    entry(Command::Stop, "Stop", Empty, Empty),
    entry(Command::GetTime, "GetTime", Empty, Fixed(FULL_TIMESTAMP_SIZE)),
    entry(Command::SetTime, "SetTime", Fixed(FULL_TIMESTAMP_SIZE), Empty),
    entry(Command::QuerySpy, "QuerySpy", Fixed(4), Fixed(4)),
    entry(Command::ClearTotalizer, "ClearTotalizer", Empty, Empty),
    entry(Command::GetVersionInfo, "GetVersionInfo", Empty, Opaque),
    entry(Command::SetMonitorChannel, "SetMonitorChannel", Fixed(4), Empty),
    entry(Command::ClearMonitorChannel, "ClearMonitorChannel", Empty, Empty),
    entry(Command::GetBaseChannel, "GetBaseChannel", Empty, Fixed(4)),
    entry(Command::EnableSpy, "EnableSpy", Empty, Empty),
    entry(Command::DisableSpy, "DisableSpy", Empty, Empty),
    entry(Command::GetLcVersion, "GetLcVersion", Empty, Opaque),
    entry(Command::GetConfig, "GetConfig", Empty, Fixed(CONFIG_PAYLOAD_SIZE)),
    entry(Command::SetConfig, "SetConfig", Fixed(CONFIG_PAYLOAD_SIZE), Empty),
];

/// Look up a raw command ID in the registry
#[must_use]
pub fn lookup(command_id: u32) -> Lookup {
    match Command::from_u32(command_id) {
        Some(command) => Lookup::Known(command.descriptor()),
        None => Lookup::Unknown { command_id },
    }
}

impl Command {
    /// Convert from a wire command ID
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x00 => Some(Self::Ping),
            0x01 => Some(Self::Close),
            0x02 => Some(Self::StatusQuery),
            0x64 => Some(Self::GetReadings),
            0x65 => Some(Self::Reset),
            0x66 => Some(Self::ReadInternalErrors),
            0x67 => Some(Self::Start),
            0x68 => Some(Self::Stop),
            0x69 => Some(Self::GetTime),
            0x6A => Some(Self::SetTime),
            0x6F => Some(Self::QuerySpy),
            0x71 => Some(Self::ClearTotalizer),
            0x72 => Some(Self::GetVersionInfo),
            0x75 => Some(Self::SetMonitorChannel),
            0x76 => Some(Self::ClearMonitorChannel),
            0x77 => Some(Self::GetBaseChannel),
            0x7C => Some(Self::EnableSpy),
            0x7D => Some(Self::DisableSpy),
            0x7F => Some(Self::GetLcVersion),
            0x80 => Some(Self::GetConfig),
            0x81 => Some(Self::SetConfig),
            _ => None,
        }
    }

    /// Convert to wire command ID
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Registry entry for this command
    #[must_use]
    pub fn descriptor(self) -> &'static CommandDescriptor {
        // COMMANDS is sorted by ID and holds every variant.
        let index = COMMANDS.partition_point(|d| d.command.as_u32() < self.as_u32());
        &COMMANDS[index]
    }

    /// Human readable name
    #[must_use]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(descriptor) => write!(f, "{}", descriptor.name),
            Self::Unknown { command_id } => write!(f, "Unknown({command_id:#010x})"),
        }
    }
}

//! Fixed-layout payload structures
//!
//! Every structure here has a pure `decode` / `encode` pair. Decoding never
//! validates or zeroes bytes the instrument documents as unknown; they are
//! carried in explicit `reserved` / `preserved` fields and written back
//! unchanged, so a read-modify-write cycle cannot corrupt instrument state.
//!
//! All integers and floats are big-endian; floats are IEEE-754 single
//! precision.

mod channel;
mod config;
mod readings;
mod start;
mod status;
mod time;
mod version;

pub use channel::{
    AlarmConfig, AlarmLevel, CHANNEL_COUNT, CHANNEL_RECORD_SIZE, Calibration, ChannelConfig,
    ChannelId, ChannelKind, CurrentRange, OhmsRange, PreservedBits, RtdRange, ThermocoupleType,
    VacRange, VdcRange,
};
pub use config::{
    ANALOG_CHANNEL_COUNT, COMPUTED_CHANNEL_COUNT, CONFIG_HEADER_SIZE, CONFIG_PACKET_SIZE,
    CONFIG_PAYLOAD_SIZE, ConfigBlock, ConfigFlags, EQUATION_TRAILER_SIZE, Interval, Speed,
};
pub use readings::{READINGS_HEADER_SIZE, READING_FIXED_SIZE, Reading, ReadingsResponse};
pub use start::{START_REQUEST_SIZE, StartRequest};
pub use status::InstrumentStatus;
pub use time::{FULL_TIMESTAMP_SIZE, FullTimestamp, TIMESTAMP_SIZE, Timestamp};
pub use version::VersionInfo;

use crate::protocol::{Error, Result};

/// Fail with `TruncatedInput` unless `bytes` holds at least `needed` bytes
pub(crate) fn ensure_len(bytes: &[u8], needed: usize, structure: &'static str) -> Result<()> {
    if bytes.len() < needed {
        return Err(Error::truncated(structure, needed, bytes.len()));
    }
    Ok(())
}

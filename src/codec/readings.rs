//! Scan readings returned by `GetReadings`
//!
//! ```text
//! header:  [chunk length (4)] [chunk count (4)] [remaining on instrument (4)]
//! chunk:   [marker (4)] [timestamp (8)] [DIO (2)] [ms (2)]
//!          [alarm1 mask (4)] [alarm2 mask (4)] [totalizer (4)] [value f32 (4)] * n
//! ```
//!
//! `n` is the number of enabled channels; values appear in ascending
//! channel order.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::trace;

use super::channel::ChannelId;
use super::config::ConfigBlock;
use super::time::{TIMESTAMP_SIZE, Timestamp};
use super::ensure_len;
use crate::protocol::{Error, Result};

/// Size of the response header
pub const READINGS_HEADER_SIZE: usize = 12;

/// Size of a reading chunk without its values
pub const READING_FIXED_SIZE: usize = 28;

/// Marker the instrument writes at the start of every chunk
const DEFAULT_MARKER: u32 = 0x10;

/// One scan
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Chunk marker, normally `0x10`; not validated
    pub marker: u32,
    /// Scan time
    pub time: Timestamp,
    /// Digital I/O lines
    pub dio_status: u16,
    /// Milliseconds within the second
    pub milliseconds: u16,
    /// Channels in alarm 1, bit `n - 1` for channel `n`
    pub alarm1_mask: u32,
    /// Channels in alarm 2
    pub alarm2_mask: u32,
    /// Totalizer count
    pub totalizer: u32,
    /// One value per enabled channel
    pub values: Vec<f32>,
}

impl Reading {
    /// Reading with the default marker
    #[must_use]
    pub fn new(time: Timestamp, milliseconds: u16, values: Vec<f32>) -> Self {
        Self {
            marker: DEFAULT_MARKER,
            time,
            dio_status: 0,
            milliseconds,
            alarm1_mask: 0,
            alarm2_mask: 0,
            totalizer: 0,
            values,
        }
    }

    /// Size of this reading's chunk
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        READING_FIXED_SIZE + 4 * self.values.len()
    }

    /// Parse one chunk; every 4 bytes after the fixed part is a value
    pub fn decode(mut chunk: &[u8]) -> Result<Self> {
        ensure_len(chunk, READING_FIXED_SIZE, "reading")?;
        if (chunk.len() - READING_FIXED_SIZE) % 4 != 0 {
            return Err(Error::InvalidChunkLength(
                u32::try_from(chunk.len()).unwrap_or(u32::MAX),
            ));
        }

        let marker = chunk.get_u32();
        let time = Timestamp::decode(chunk)?;
        chunk.advance(TIMESTAMP_SIZE);
        let dio_status = chunk.get_u16();
        let milliseconds = chunk.get_u16();
        let alarm1_mask = chunk.get_u32();
        let alarm2_mask = chunk.get_u32();
        let totalizer = chunk.get_u32();

        let mut values = Vec::with_capacity(chunk.remaining() / 4);
        while chunk.has_remaining() {
            values.push(chunk.get_f32());
        }

        Ok(Self {
            marker,
            time,
            dio_status,
            milliseconds,
            alarm1_mask,
            alarm2_mask,
            totalizer,
            values,
        })
    }

    /// Write the chunk to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.marker);
        self.time.encode_into(dst);
        dst.put_u16(self.dio_status);
        dst.put_u16(self.milliseconds);
        dst.put_u32(self.alarm1_mask);
        dst.put_u32(self.alarm2_mask);
        dst.put_u32(self.totalizer);
        for value in &self.values {
            dst.put_f32(*value);
        }
    }

    /// State of digital I/O line `bit` (0..=15)
    #[must_use]
    pub const fn dio(&self, bit: u8) -> bool {
        bit < 16 && self.dio_status & (1 << bit) != 0
    }

    /// Whether `channel` is in alarm 1
    #[must_use]
    pub const fn alarm1(&self, channel: ChannelId) -> bool {
        self.alarm1_mask & channel.mask_bit() != 0
    }

    /// Whether `channel` is in alarm 2
    #[must_use]
    pub const fn alarm2(&self, channel: ChannelId) -> bool {
        self.alarm2_mask & channel.mask_bit() != 0
    }

    /// Values keyed by channel number, pairing them with the enabled
    /// channels of the configuration the scan ran under
    ///
    /// The result plugs into [`crate::equation::evaluate`]. Disabled
    /// channels are absent. Values beyond the enabled channel count are
    /// dropped.
    #[must_use]
    pub fn channel_values(&self, config: &ConfigBlock) -> BTreeMap<u16, f32> {
        config
            .enabled_channels()
            .map(|id| u16::from(id.get()))
            .zip(self.values.iter().copied())
            .collect()
    }

    /// Calendar time of the scan, see [`Timestamp::to_datetime`]
    #[must_use]
    pub fn to_datetime(&self, reference: NaiveDate) -> Option<NaiveDateTime> {
        self.time
            .to_datetime(u32::from(self.milliseconds), reference)
    }
}

/// Decoded `GetReadings` response
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingsResponse {
    /// Chunk length as sent; only meaningful when there are no readings
    pub chunk_length: u32,
    /// Readings still queued on the instrument
    pub remaining: u32,
    /// Readings in this packet
    pub readings: Vec<Reading>,
}

impl ReadingsResponse {
    /// Number of readings in this packet
    #[must_use]
    pub fn count_in_packet(&self) -> usize {
        self.readings.len()
    }

    /// Readings still queued on the instrument
    #[must_use]
    pub const fn count_remaining_on_instrument(&self) -> u32 {
        self.remaining
    }

    /// Parse a response payload
    ///
    /// Bytes after the last chunk are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, READINGS_HEADER_SIZE, "readings header")?;

        let mut header = bytes;
        let chunk_length = header.get_u32();
        let chunk_count = header.get_u32();
        let remaining = header.get_u32();

        if chunk_count == 0 {
            return Ok(Self {
                chunk_length,
                remaining,
                readings: Vec::new(),
            });
        }

        let chunk_len = chunk_length as usize;
        if chunk_len < READING_FIXED_SIZE || (chunk_len - READING_FIXED_SIZE) % 4 != 0 {
            return Err(Error::InvalidChunkLength(chunk_length));
        }

        let needed = (chunk_count as usize)
            .checked_mul(chunk_len)
            .and_then(|body| body.checked_add(READINGS_HEADER_SIZE))
            .unwrap_or(usize::MAX);
        ensure_len(bytes, needed, "readings")?;

        let readings = bytes[READINGS_HEADER_SIZE..needed]
            .chunks_exact(chunk_len)
            .map(Reading::decode)
            .collect::<Result<Vec<_>>>()?;

        trace!(
            count = readings.len(),
            remaining,
            channels = (chunk_len - READING_FIXED_SIZE) / 4,
            "decoded readings"
        );

        Ok(Self {
            chunk_length,
            remaining,
            readings,
        })
    }

    /// Encode to a response payload
    ///
    /// All readings must carry the same number of values.
    pub fn encode(&self) -> Result<BytesMut> {
        let chunk_len = match self.readings.first() {
            Some(first) => first.chunk_len(),
            None => self.chunk_length as usize,
        };

        let mut dst =
            BytesMut::with_capacity(READINGS_HEADER_SIZE + chunk_len * self.readings.len());
        dst.put_u32(u32::try_from(chunk_len).unwrap_or(u32::MAX));
        dst.put_u32(u32::try_from(self.readings.len()).unwrap_or(u32::MAX));
        dst.put_u32(self.remaining);

        for reading in &self.readings {
            if reading.chunk_len() != chunk_len {
                return Err(Error::EncodedSizeMismatch {
                    structure: "reading",
                    expected: chunk_len,
                    got: reading.chunk_len(),
                });
            }
            reading.encode_into(&mut dst);
        }
        Ok(dst)
    }
}

//! Instrument time stamps
//!
//! ```text
//! short (8 bytes):  [hh] [mm] [ss] [month] [reserved] [day] [yy] [reserved]
//! full (12 bytes):  [short (8)] [milliseconds (4)]
//! ```

use bytes::{Buf, BufMut};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

use super::ensure_len;
use crate::protocol::Result;

/// Size of the short time stamp
pub const TIMESTAMP_SIZE: usize = 8;

/// Size of the full time stamp (short form plus milliseconds)
pub const FULL_TIMESTAMP_SIZE: usize = 12;

/// Reserved bytes as the instrument itself writes them.
const DEFAULT_RESERVED: [u8; 2] = [0x08, 0x00];

/// Short instrument time stamp (no sub-second part)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    /// Hours, 0..=23
    pub hours: u8,
    /// Minutes, 0..=59
    pub minutes: u8,
    /// Seconds, 0..=59
    pub seconds: u8,
    /// Month, 1..=12
    pub month: u8,
    /// Day of month, 1..=31
    pub day: u8,
    /// Two-digit year
    pub year: u8,
    /// Unknown bytes following `month` and `year`
    pub reserved: [u8; 2],
}

impl Timestamp {
    /// Create a time stamp with the instrument's default reserved bytes
    #[must_use]
    pub const fn new(hours: u8, minutes: u8, seconds: u8, month: u8, day: u8, year: u8) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            month,
            day,
            year,
            reserved: DEFAULT_RESERVED,
        }
    }

    /// All-zero stamp, used by start requests to mean "now"
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds: 0,
            month: 0,
            day: 0,
            year: 0,
            reserved: [0; 2],
        }
    }

    /// Parse from the first 8 bytes of `bytes`
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, TIMESTAMP_SIZE, "timestamp")?;
        let hours = bytes.get_u8();
        let minutes = bytes.get_u8();
        let seconds = bytes.get_u8();
        let month = bytes.get_u8();
        let reserved0 = bytes.get_u8();
        let day = bytes.get_u8();
        let year = bytes.get_u8();
        let reserved1 = bytes.get_u8();
        Ok(Self {
            hours,
            minutes,
            seconds,
            month,
            day,
            year,
            reserved: [reserved0, reserved1],
        })
    }

    /// Write the 8-byte form to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.to_bytes());
    }

    /// Convert to bytes
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; TIMESTAMP_SIZE] {
        [
            self.hours,
            self.minutes,
            self.seconds,
            self.month,
            self.reserved[0],
            self.day,
            self.year,
            self.reserved[1],
        ]
    }

    /// Build from any chrono date/time; the year is reduced to two digits
    #[must_use]
    pub fn from_datetime<T: Datelike + Timelike>(value: &T) -> Self {
        Self::new(
            value.hour() as u8,
            value.minute() as u8,
            value.second() as u8,
            value.month() as u8,
            value.day() as u8,
            value.year().rem_euclid(100) as u8,
        )
    }

    /// Resolve to a calendar date/time relative to `reference` (usually today)
    ///
    /// The century comes from `reference`, except that a December stamp seen
    /// in January belongs to the previous year. Returns `None` for fields
    /// that do not form a valid date.
    #[must_use]
    pub fn to_datetime(&self, milliseconds: u32, reference: NaiveDate) -> Option<NaiveDateTime> {
        let mut base_year = reference.year();
        if self.month == 12 && reference.month() == 1 {
            base_year -= 1;
        }
        base_year -= base_year.rem_euclid(100);

        NaiveDate::from_ymd_opt(
            base_year + i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_milli_opt(
            u32::from(self.hours),
            u32::from(self.minutes),
            u32::from(self.seconds),
            milliseconds,
        )
    }
}

/// Full time stamp as used by get/set time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FullTimestamp {
    /// Date and time of day
    pub time: Timestamp,
    /// Milliseconds within the second
    pub milliseconds: u32,
}

impl FullTimestamp {
    /// Current local time
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// Build from any chrono date/time
    #[must_use]
    pub fn from_datetime<T: Datelike + Timelike>(value: &T) -> Self {
        Self {
            time: Timestamp::from_datetime(value),
            milliseconds: (value.nanosecond() / 1_000_000).min(999),
        }
    }

    /// Resolve to a calendar date/time, see [`Timestamp::to_datetime`]
    #[must_use]
    pub fn to_datetime(&self, reference: NaiveDate) -> Option<NaiveDateTime> {
        self.time.to_datetime(self.milliseconds, reference)
    }

    /// Parse from the first 12 bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, FULL_TIMESTAMP_SIZE, "full timestamp")?;
        let time = Timestamp::decode(bytes)?;
        let mut rest = &bytes[TIMESTAMP_SIZE..];
        Ok(Self {
            time,
            milliseconds: rest.get_u32(),
        })
    }

    /// Write the 12-byte form to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        self.time.encode_into(dst);
        dst.put_u32(self.milliseconds);
    }

    /// Convert to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FULL_TIMESTAMP_SIZE] {
        let mut bytes = [0u8; FULL_TIMESTAMP_SIZE];
        self.encode_into(&mut &mut bytes[..]);
        bytes
    }
}

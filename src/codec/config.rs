//! Instrument configuration block
//!
//! ```text
//! offset  size
//!      0     4  flags
//!      4     8  reserved
//!     12     8  scan interval (seconds, milliseconds)
//!     20     8  reserved
//!     28     8  alarm scan interval (seconds, milliseconds)
//!     36    12  reserved
//!     48     4  unknown (0x64)
//!     52  1440  30 channel records
//!   1492  1000  equation trailer
//! ```

use std::fmt;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, instrument, trace};

use super::channel::{CHANNEL_COUNT, CHANNEL_RECORD_SIZE, ChannelConfig, ChannelId, ChannelKind};
use super::ensure_len;
use crate::equation::{EquationProgram, decode_program};
use crate::protocol::{Error, HEADER_SIZE, Result};

/// Size of the fixed header before the channel records
pub const CONFIG_HEADER_SIZE: usize = 52;

/// Size of the equation trailer
pub const EQUATION_TRAILER_SIZE: usize = 1000;

/// Size of the whole configuration payload
pub const CONFIG_PAYLOAD_SIZE: usize =
    CONFIG_HEADER_SIZE + CHANNEL_COUNT * CHANNEL_RECORD_SIZE + EQUATION_TRAILER_SIZE;

/// Size of a framed `SetConfig` packet
pub const CONFIG_PACKET_SIZE: usize = HEADER_SIZE + CONFIG_PAYLOAD_SIZE;

/// Channels 1..=20 measure input terminals
pub const ANALOG_CHANNEL_COUNT: usize = 20;

/// Channels 21..=30 are computed
pub const COMPUTED_CHANNEL_COUNT: usize = CHANNEL_COUNT - ANALOG_CHANNEL_COUNT;

const TRAILER_OFFSET: usize = CONFIG_HEADER_SIZE + CHANNEL_COUNT * CHANNEL_RECORD_SIZE;
const DEFAULT_HEADER_TAIL: u32 = 0x64;

/// Scan speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Speed {
    /// Slow, highest resolution
    #[default]
    Slow,
    /// Medium
    Medium,
    /// Fast
    Fast,
}

/// Configuration flag word
///
/// Bits above the nine documented flags are kept as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfigFlags(u32);

impl ConfigFlags {
    /// Medium speed
    pub const MEDIUM_SPEED: u32 = 0x0001;
    /// Fast speed
    pub const FAST_SPEED: u32 = 0x0002;
    /// Report temperatures in °F
    pub const FAHRENHEIT: u32 = 0x0004;
    /// Drive the trigger output on each scan
    pub const TRIGGER_OUT: u32 = 0x0008;
    /// Drift correction, required unless scanning fast
    pub const DRIFT_CORRECTION: u32 = 0x0010;
    /// Debounce the totalizer input
    pub const TOTALIZER_DEBOUNCE: u32 = 0x0020;
    /// Scan on the interval timer
    pub const INTERVAL_TRIGGER: u32 = 0x0040;
    /// Scan on alarms
    pub const ALARM_TRIGGER: u32 = 0x0080;
    /// Scan on the external trigger input
    pub const EXTERNAL_TRIGGER: u32 = 0x0100;
    /// All documented bits
    pub const KNOWN_MASK: u32 = 0x01FF;

    const SPEED_MASK: u32 = Self::MEDIUM_SPEED | Self::FAST_SPEED;

    /// Create from the raw word
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// Raw word
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Set a flag
    #[must_use]
    pub const fn with(mut self, flag: u32) -> Self {
        self.0 |= flag;
        self
    }

    /// Clear a flag
    #[must_use]
    pub const fn without(mut self, flag: u32) -> Self {
        self.0 &= !flag;
        self
    }

    /// Check if flag is set
    #[must_use]
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Scan speed; the fast bit wins if both speed bits are set
    #[must_use]
    pub const fn speed(self) -> Speed {
        if self.has(Self::FAST_SPEED) {
            Speed::Fast
        } else if self.has(Self::MEDIUM_SPEED) {
            Speed::Medium
        } else {
            Speed::Slow
        }
    }

    /// Replace the speed bits
    #[must_use]
    pub const fn with_speed(self, speed: Speed) -> Self {
        let cleared = self.without(Self::SPEED_MASK);
        match speed {
            Speed::Slow => cleared,
            Speed::Medium => cleared.with(Self::MEDIUM_SPEED),
            Speed::Fast => cleared.with(Self::FAST_SPEED),
        }
    }

    /// Bits outside the documented set
    #[must_use]
    pub const fn unknown_bits(self) -> u32 {
        self.0 & !Self::KNOWN_MASK
    }
}

impl fmt::Display for ConfigFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u32, &str); 9] = [
            (ConfigFlags::MEDIUM_SPEED, "MEDIUM"),
            (ConfigFlags::FAST_SPEED, "FAST"),
            (ConfigFlags::FAHRENHEIT, "FAHRENHEIT"),
            (ConfigFlags::TRIGGER_OUT, "TRIGGER_OUT"),
            (ConfigFlags::DRIFT_CORRECTION, "DRIFT_CORRECTION"),
            (ConfigFlags::TOTALIZER_DEBOUNCE, "TOTALIZER_DEBOUNCE"),
            (ConfigFlags::INTERVAL_TRIGGER, "INTERVAL_TRIGGER"),
            (ConfigFlags::ALARM_TRIGGER, "ALARM_TRIGGER"),
            (ConfigFlags::EXTERNAL_TRIGGER, "EXTERNAL_TRIGGER"),
        ];

        let parts: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            write!(f, "NONE")?;
        } else {
            write!(f, "{}", parts.join(" | "))?;
        }
        if self.unknown_bits() != 0 {
            write!(f, " (+{:#x})", self.unknown_bits())?;
        }
        Ok(())
    }
}

/// Scan interval as stored by the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    /// Whole seconds
    pub seconds: u32,
    /// Milliseconds, normally 0..=999
    pub milliseconds: u32,
}

impl Interval {
    /// Split a duration into seconds and milliseconds
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            seconds: u32::try_from(duration.as_secs()).unwrap_or(u32::MAX),
            milliseconds: duration.subsec_millis(),
        }
    }

    /// Combined duration
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.seconds))
            + Duration::from_millis(u64::from(self.milliseconds))
    }

    fn decode(bytes: &mut &[u8]) -> Self {
        Self {
            seconds: bytes.get_u32(),
            milliseconds: bytes.get_u32(),
        }
    }

    fn encode_into(self, dst: &mut impl BufMut) {
        dst.put_u32(self.seconds);
        dst.put_u32(self.milliseconds);
    }
}

/// The complete configuration payload of `SetConfig` / `GetConfig`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfigBlock {
    /// Flag word
    pub flags: ConfigFlags,
    /// Scan interval
    pub interval: Interval,
    /// Scan interval while an alarm is active
    pub alarm_interval: Interval,
    /// Reserved header words in wire order (offsets 4, 8, 20, 24, 36, 40, 44)
    pub header_reserved: [u32; 7],
    /// Unknown word at offset 48
    pub header_tail: u32,
    channels: [ChannelConfig; CHANNEL_COUNT],
    trailer: Vec<u8>,
}

impl Default for ConfigBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBlock {
    /// Fresh configuration: all channels off, slow interval-triggered
    /// scanning once a second, drift correction and totalizer debounce on
    #[must_use]
    pub fn new() -> Self {
        let flags = ConfigFlags::default()
            .with(ConfigFlags::DRIFT_CORRECTION)
            .with(ConfigFlags::TOTALIZER_DEBOUNCE)
            .with(ConfigFlags::INTERVAL_TRIGGER);
        let one_second = Interval {
            seconds: 1,
            milliseconds: 0,
        };

        Self {
            flags,
            interval: one_second,
            alarm_interval: one_second,
            header_reserved: [0; 7],
            header_tail: DEFAULT_HEADER_TAIL,
            channels: std::array::from_fn(|_| ChannelConfig::off()),
            trailer: vec![0; EQUATION_TRAILER_SIZE],
        }
    }

    /// Parse a configuration payload, rejecting unknown codes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_inner(bytes, ChannelConfig::decode)
    }

    /// Parse a configuration payload, keeping unknown channel records as
    /// [`ChannelKind::Unrecognized`]
    pub fn decode_lenient(bytes: &[u8]) -> Result<Self> {
        Self::decode_inner(bytes, ChannelConfig::decode_lenient)
    }

    #[instrument(level = "trace", skip_all, fields(len = bytes.len()))]
    fn decode_inner(bytes: &[u8], decode_channel: fn(&[u8]) -> Result<ChannelConfig>) -> Result<Self> {
        ensure_len(bytes, CONFIG_PAYLOAD_SIZE, "config block")?;

        let mut header = &bytes[..CONFIG_HEADER_SIZE];
        let flags = ConfigFlags::from_u32(header.get_u32());
        let mut header_reserved = [0u32; 7];
        header_reserved[0] = header.get_u32();
        header_reserved[1] = header.get_u32();
        let interval = Interval::decode(&mut header);
        header_reserved[2] = header.get_u32();
        header_reserved[3] = header.get_u32();
        let alarm_interval = Interval::decode(&mut header);
        header_reserved[4] = header.get_u32();
        header_reserved[5] = header.get_u32();
        header_reserved[6] = header.get_u32();
        let header_tail = header.get_u32();

        let trailer = bytes[TRAILER_OFFSET..CONFIG_PAYLOAD_SIZE].to_vec();

        let records = bytes[CONFIG_HEADER_SIZE..TRAILER_OFFSET].chunks_exact(CHANNEL_RECORD_SIZE);
        let mut channels: [ChannelConfig; CHANNEL_COUNT] =
            std::array::from_fn(|_| ChannelConfig::off());
        for (channel, record) in channels.iter_mut().zip(records) {
            *channel = decode_channel(record)?;
        }

        for (index, channel) in channels.iter_mut().enumerate() {
            if let ChannelKind::Equation { offset, program } = &mut channel.kind {
                let start = usize::try_from(*offset).unwrap_or(usize::MAX);
                *program = decode_program(trailer.get(start..).unwrap_or(&[]));
                trace!(channel = index + 1, offset = *offset, %program, "decoded equation");
            }
        }

        Ok(Self {
            flags,
            interval,
            alarm_interval,
            header_reserved,
            header_tail,
            channels,
            trailer,
        })
    }

    /// Encode to the 2492-byte payload
    ///
    /// Equation programs are written into a copy of the trailer at their
    /// recorded offsets; bytes no program covers are emitted unchanged.
    pub fn encode(&self) -> Result<BytesMut> {
        let trailer = self.render_trailer()?;

        let mut dst = BytesMut::with_capacity(CONFIG_PAYLOAD_SIZE);
        dst.put_u32(self.flags.as_u32());
        dst.put_u32(self.header_reserved[0]);
        dst.put_u32(self.header_reserved[1]);
        self.interval.encode_into(&mut dst);
        dst.put_u32(self.header_reserved[2]);
        dst.put_u32(self.header_reserved[3]);
        self.alarm_interval.encode_into(&mut dst);
        dst.put_u32(self.header_reserved[4]);
        dst.put_u32(self.header_reserved[5]);
        dst.put_u32(self.header_reserved[6]);
        dst.put_u32(self.header_tail);

        for channel in &self.channels {
            channel.encode_into(&mut dst);
        }
        dst.put_slice(&trailer);

        if dst.len() != CONFIG_PAYLOAD_SIZE {
            return Err(Error::EncodedSizeMismatch {
                structure: "config block",
                expected: CONFIG_PAYLOAD_SIZE,
                got: dst.len(),
            });
        }
        Ok(dst)
    }

    fn render_trailer(&self) -> Result<Vec<u8>> {
        let mut spans: Vec<(u8, usize, usize, &EquationProgram)> = Vec::new();

        for (id, channel) in ChannelId::all().zip(&self.channels) {
            let ChannelKind::Equation { offset, program } = &channel.kind else {
                continue;
            };
            let len = program.encoded_len();
            if len == 0 {
                continue;
            }

            let start = usize::try_from(*offset).unwrap_or(usize::MAX);
            let end = start.saturating_add(len);
            if end > EQUATION_TRAILER_SIZE {
                return Err(Error::TrailerOverflow {
                    channel: id.get(),
                    start,
                    end,
                    capacity: EQUATION_TRAILER_SIZE,
                });
            }
            spans.push((id.get(), start, end, program));
        }

        spans.sort_by_key(|&(_, start, _, _)| start);
        for pair in spans.windows(2) {
            let (first, first_start, first_end, first_program) = pair[0];
            let (second, second_start, _, second_program) = pair[1];
            let shared = first_start == second_start && first_program == second_program;
            if second_start < first_end && !shared {
                return Err(Error::TrailerOverlap { first, second });
            }
        }

        let mut trailer = self.trailer.clone();
        trailer.resize(EQUATION_TRAILER_SIZE, 0);
        for (_, start, end, program) in spans {
            program.encode_into(&mut &mut trailer[start..end]);
        }
        Ok(trailer)
    }

    /// Channel configuration
    #[must_use]
    pub fn channel(&self, id: ChannelId) -> &ChannelConfig {
        &self.channels[id.index()]
    }

    /// Mutable channel configuration, without validation
    pub fn channel_mut(&mut self, id: ChannelId) -> &mut ChannelConfig {
        &mut self.channels[id.index()]
    }

    /// All channels with their ids
    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &ChannelConfig)> {
        ChannelId::all().zip(&self.channels)
    }

    /// Channels that take part in scans, in ascending order
    ///
    /// Each reading carries one value per channel yielded here, in the same
    /// order.
    pub fn enabled_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels()
            .filter(|(_, channel)| channel.kind.is_enabled())
            .map(|(id, _)| id)
    }

    /// Validate and store a channel configuration
    pub fn set_channel(&mut self, id: ChannelId, config: ChannelConfig) -> Result<()> {
        config.validate(id)?;
        debug!(channel = %id, kind = ?config.kind, "set channel");
        self.channels[id.index()] = config;
        Ok(())
    }

    /// Turn a channel off
    pub fn clear_channel(&mut self, id: ChannelId) {
        self.channels[id.index()] = ChannelConfig::off();
    }

    /// Store `program` after the last equation in the trailer and make
    /// channel `id` an equation channel pointing at it
    ///
    /// Returns the trailer offset. Alarm and scaling settings of the channel
    /// are kept.
    pub fn push_equation(&mut self, id: ChannelId, program: EquationProgram) -> Result<u32> {
        if !id.is_computed() {
            return Err(Error::InvalidChannelConfig {
                channel: id.get(),
                reason: "equations need a computed channel",
            });
        }

        let start = self
            .channels()
            .filter(|(other, _)| *other != id)
            .filter_map(|(_, channel)| match &channel.kind {
                ChannelKind::Equation { offset, program } if program.encoded_len() > 0 => {
                    Some(*offset as usize + program.encoded_len())
                }
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let end = start + program.encoded_len();
        if end > EQUATION_TRAILER_SIZE {
            return Err(Error::TrailerOverflow {
                channel: id.get(),
                start,
                end,
                capacity: EQUATION_TRAILER_SIZE,
            });
        }

        let offset = u32::try_from(start).unwrap_or(u32::MAX);
        debug!(channel = %id, offset, len = program.encoded_len(), "allocated equation");
        self.channels[id.index()].kind = ChannelKind::Equation { offset, program };
        Ok(offset)
    }

    /// Program of an equation channel
    #[must_use]
    pub fn equation(&self, id: ChannelId) -> Option<&EquationProgram> {
        match &self.channel(id).kind {
            ChannelKind::Equation { program, .. } => Some(program),
            _ => None,
        }
    }

    /// Raw equation trailer as last decoded or created
    #[must_use]
    pub fn equation_trailer(&self) -> &[u8] {
        &self.trailer
    }

    /// Scan speed
    #[must_use]
    pub const fn speed(&self) -> Speed {
        self.flags.speed()
    }

    /// Set the scan speed; drift correction is forced on unless fast
    pub fn set_speed(&mut self, speed: Speed) {
        self.flags = self.flags.with_speed(speed);
        if speed != Speed::Fast {
            self.flags = self.flags.with(ConfigFlags::DRIFT_CORRECTION);
        }
    }

    /// Enable or disable a flag
    pub fn set_flag(&mut self, flag: u32, enabled: bool) {
        self.flags = if enabled {
            self.flags.with(flag)
        } else {
            self.flags.without(flag)
        };
    }

    /// Whether a disabled channel precedes an enabled one within the
    /// analog or the computed group; some instruments reject such layouts
    #[must_use]
    pub fn has_channel_gaps(&self) -> bool {
        let (analog, computed) = self.channels.split_at(ANALOG_CHANNEL_COUNT);
        [analog, computed].iter().any(|group| {
            group
                .iter()
                .skip_while(|c| c.kind.is_enabled())
                .any(|c| c.kind.is_enabled())
        })
    }
}

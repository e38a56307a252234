//! Per-channel configuration records
//!
//! Each of the 30 channels occupies a 48-byte record of twelve big-endian
//! words:
//!
//! ```text
//! [type] [range] [aux1] [aux2] [extra] [alarm bits]
//! [alarm1 level f32] [alarm2 level f32] [alarm1 DO] [alarm2 DO]
//! [mx+b multiplier f32] [mx+b offset f32]
//! ```
//!
//! The meaning of `range`, `aux1`, `aux2` and `extra` depends on the type.
//! Typed fields produce a canonical value for those words; whatever the
//! wire carries beyond that is kept in [`PreservedBits`].

use std::fmt;

use bytes::{Buf, BufMut};
use tracing::trace;

use super::config::ANALOG_CHANNEL_COUNT;
use super::ensure_len;
use crate::equation::EquationProgram;
use crate::protocol::{Error, Result};

/// Number of channel records in a configuration block
pub const CHANNEL_COUNT: usize = 30;

/// Size of one channel record
pub const CHANNEL_RECORD_SIZE: usize = 48;

const TYPE_OFF: u32 = 0x0000_0000;
const TYPE_OHMS: u32 = 0x0000_0001;
const TYPE_VDC: u32 = 0x0000_0002;
const TYPE_VAC: u32 = 0x0000_0004;
const TYPE_FREQUENCY: u32 = 0x0000_0008;
const TYPE_RTD: u32 = 0x0000_0010;
const TYPE_THERMOCOUPLE: u32 = 0x0000_0020;
const TYPE_CURRENT: u32 = 0x0001_0002;
const TYPE_AVERAGE: u32 = 0x0000_8001;
const TYPE_A_DIFF_B: u32 = 0x0000_8002;
const TYPE_A_DIFF_AVERAGE: u32 = 0x0000_8003;
const TYPE_EQUATION: u32 = 0x0000_8004;

const OHMS_EXTRA: u32 = 0x9000;
const RTD_EXTRA: u32 = 0x9001;
const CURRENT_EXTRA: u32 = 0x7000;

const ALARM_TRIGGER_BIT: u32 = 0x01;
const ALARM_HI: u32 = 0x01;
const ALARM_LO: u32 = 0x02;
const ALARM1_SHIFT: u32 = 1;
const ALARM2_SHIFT: u32 = 3;

/// 1-based channel number, 1..=30
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelId(u8);

impl ChannelId {
    /// Validate a channel number
    pub fn new(channel: u32) -> Result<Self> {
        match u8::try_from(channel) {
            Ok(n) if (1..=CHANNEL_COUNT as u8).contains(&n) => Ok(Self(n)),
            _ => Err(Error::InvalidChannel(channel)),
        }
    }

    /// Channel for a 0-based record index
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        (index < CHANNEL_COUNT).then(|| Self(index as u8 + 1))
    }

    /// Channel number
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// 0-based record index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Channels 21..=30 hold computed channels
    #[must_use]
    pub const fn is_computed(self) -> bool {
        self.0 as usize > ANALOG_CHANNEL_COUNT
    }

    /// This channel's bit in channel masks (bit `n - 1` for channel `n`)
    #[must_use]
    pub const fn mask_bit(self) -> u32 {
        1 << (self.0 - 1)
    }

    /// All channels in order
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=CHANNEL_COUNT as u8).map(Self)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

macro_rules! range_code {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code,)+
        }

        impl $name {
            /// Convert from the wire code
            #[must_use]
            pub const fn from_u32(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Wire code
            #[must_use]
            pub const fn as_u32(self) -> u32 {
                self as u32
            }

            fn decode(code: u32) -> Result<Self> {
                Self::from_u32(code).ok_or(Error::UnknownEnumCode { field: $field, code })
            }
        }
    };
}

range_code! {
    /// Resistance ranges
    OhmsRange, "ohms range" {
        /// 300 Ω
        R300 = 0x1001,
        /// 3 kΩ
        R3k = 0x1102,
        /// 30 kΩ
        R30k = 0x1204,
        /// 300 kΩ
        R300k = 0x1308,
        /// 3 MΩ
        R3M = 0x1410,
        /// Autorange
        Auto = 0x1520,
    }
}

range_code! {
    /// DC voltage ranges
    VdcRange, "VDC range" {
        /// 90 mV
        Mv90 = 0x2001,
        /// 300 mV
        Mv300 = 0x2102,
        /// 3 V
        V3 = 0x2308,
        /// 30 V
        V30 = 0x2410,
        /// Autorange
        Auto = 0x2520,
        /// 50 V
        V50 = 0x2640,
    }
}

range_code! {
    /// AC voltage ranges
    VacRange, "VAC range" {
        /// 300 mV
        Mv300 = 0x3001,
        /// 3 V
        V3 = 0x3102,
        /// 30 V
        V30 = 0x3204,
        /// Autorange
        Auto = 0x3308,
    }
}

range_code! {
    /// Current ranges (measured across an external shunt)
    CurrentRange, "current range" {
        /// 20 mA
        Ma20 = 0x2102,
        /// 100 mA
        Ma100 = 0x2520,
    }
}

range_code! {
    /// Thermocouple types
    ThermocoupleType, "thermocouple type" {
        /// Type J
        J = 0x6001,
        /// Type K
        K = 0x6101,
        /// Type E
        E = 0x6201,
        /// Type T
        T = 0x6301,
        /// Type R
        R = 0x6401,
        /// Type S
        S = 0x6501,
        /// Type B
        B = 0x6601,
        /// Type C
        C = 0x6701,
        /// Type N
        N = 0x6801,
    }
}

range_code! {
    /// RTD curves
    RtdRange, "RTD range" {
        /// Fixed α = 0.00385 curve
        Fixed385 = 0x5020,
        /// α = 0.00385 curve with a user-supplied alpha
        Custom385 = 0x5021,
    }
}

/// What a channel measures or computes
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelKind {
    /// Channel disabled
    #[default]
    Off,
    /// 2-wire resistance
    Ohms2W {
        /// Range
        range: OhmsRange,
    },
    /// 4-wire resistance
    Ohms4W {
        /// Range
        range: OhmsRange,
    },
    /// DC voltage
    Vdc {
        /// Range
        range: VdcRange,
    },
    /// AC voltage
    Vac {
        /// Range
        range: VacRange,
    },
    /// Frequency
    Frequency,
    /// Resistance temperature detector
    Rtd {
        /// Curve
        range: RtdRange,
        /// Custom alpha, 0 for the fixed curve
        alpha: f32,
        /// Resistance at 0 °C in ohms
        r0: f32,
    },
    /// Thermocouple
    Thermocouple {
        /// Thermocouple type
        range: ThermocoupleType,
        /// Report open thermocouples
        open_detect: bool,
    },
    /// Current through an external shunt
    Current {
        /// Range
        range: CurrentRange,
        /// Shunt resistance in ohms
        shunt: f32,
    },
    /// Average of the channels in `mask`
    Average {
        /// Channel mask, bit `n - 1` for channel `n`
        mask: u32,
    },
    /// Channel `a` minus channel `b`
    ADiffB {
        /// Minuend channel
        a: u32,
        /// Subtrahend channel
        b: u32,
    },
    /// Channel `a` minus the average of `mask`
    ADiffAverage {
        /// Minuend channel
        a: u32,
        /// Channel mask of the averaged channels
        mask: u32,
    },
    /// Equation stored in the configuration block trailer
    Equation {
        /// Absolute offset of the program in the trailer
        offset: u32,
        /// Decoded program; filled in by [`ConfigBlock`](super::ConfigBlock)
        program: EquationProgram,
    },
    /// Type or range code not understood, only from lenient decoding
    Unrecognized {
        /// Raw type word
        type_code: u32,
    },
}

impl ChannelKind {
    /// Type word written for this kind
    #[must_use]
    pub const fn type_code(&self) -> u32 {
        match self {
            Self::Off => TYPE_OFF,
            Self::Ohms2W { .. } | Self::Ohms4W { .. } => TYPE_OHMS,
            Self::Vdc { .. } => TYPE_VDC,
            Self::Vac { .. } => TYPE_VAC,
            Self::Frequency => TYPE_FREQUENCY,
            Self::Rtd { .. } => TYPE_RTD,
            Self::Thermocouple { .. } => TYPE_THERMOCOUPLE,
            Self::Current { .. } => TYPE_CURRENT,
            Self::Average { .. } => TYPE_AVERAGE,
            Self::ADiffB { .. } => TYPE_A_DIFF_B,
            Self::ADiffAverage { .. } => TYPE_A_DIFF_AVERAGE,
            Self::Equation { .. } => TYPE_EQUATION,
            Self::Unrecognized { type_code } => *type_code,
        }
    }

    /// Whether the channel takes part in scans
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Whether this kind is computed from other channels
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(
            self,
            Self::Average { .. }
                | Self::ADiffB { .. }
                | Self::ADiffAverage { .. }
                | Self::Equation { .. }
        )
    }

    /// Whether this kind measures an input terminal
    #[must_use]
    pub const fn is_analog(&self) -> bool {
        matches!(
            self,
            Self::Ohms2W { .. }
                | Self::Ohms4W { .. }
                | Self::Vdc { .. }
                | Self::Vac { .. }
                | Self::Frequency
                | Self::Rtd { .. }
                | Self::Thermocouple { .. }
                | Self::Current { .. }
        )
    }

    /// Canonical `[range, aux1, aux2, extra]` words
    fn words(&self) -> [u32; 4] {
        match self {
            Self::Off | Self::Frequency | Self::Unrecognized { .. } => [0; 4],
            Self::Ohms2W { range } => [range.as_u32(), 0, 0, OHMS_EXTRA],
            Self::Ohms4W { range } => [range.as_u32(), 0, 0, OHMS_EXTRA | 1],
            Self::Vdc { range } => [range.as_u32(), 0, 0, 0],
            Self::Vac { range } => [range.as_u32(), 0, 0, 0],
            Self::Rtd { range, alpha, r0 } => {
                [range.as_u32(), alpha.to_bits(), r0.to_bits(), RTD_EXTRA]
            }
            Self::Thermocouple { range, open_detect } => {
                [range.as_u32(), 0, 0, u32::from(*open_detect)]
            }
            Self::Current { range, shunt } => [
                range.as_u32(),
                shunt.to_bits(),
                0,
                CURRENT_EXTRA | u32::from(*range == CurrentRange::Ma100),
            ],
            Self::Average { mask } => [0, 0, 0, *mask],
            Self::ADiffB { a, b } => [0, *a, 0, *b],
            Self::ADiffAverage { a, mask } => [0, *a, 0, *mask],
            Self::Equation { offset, .. } => [0, 0, 0, *offset],
        }
    }

    fn decode(type_code: u32, [range, aux1, aux2, extra]: [u32; 4]) -> Result<Self> {
        Ok(match type_code {
            TYPE_OFF => Self::Off,
            TYPE_OHMS => {
                let range = OhmsRange::decode(range)?;
                if extra & 1 == 0 {
                    Self::Ohms2W { range }
                } else {
                    Self::Ohms4W { range }
                }
            }
            TYPE_VDC => Self::Vdc {
                range: VdcRange::decode(range)?,
            },
            TYPE_VAC => Self::Vac {
                range: VacRange::decode(range)?,
            },
            TYPE_FREQUENCY => Self::Frequency,
            TYPE_RTD => Self::Rtd {
                range: RtdRange::decode(range)?,
                alpha: f32::from_bits(aux1),
                r0: f32::from_bits(aux2),
            },
            TYPE_THERMOCOUPLE => Self::Thermocouple {
                range: ThermocoupleType::decode(range)?,
                open_detect: extra & 1 != 0,
            },
            TYPE_CURRENT => Self::Current {
                range: CurrentRange::decode(range)?,
                shunt: f32::from_bits(aux1),
            },
            TYPE_AVERAGE => Self::Average { mask: extra },
            TYPE_A_DIFF_B => Self::ADiffB { a: aux1, b: extra },
            TYPE_A_DIFF_AVERAGE => Self::ADiffAverage { a: aux1, mask: extra },
            TYPE_EQUATION => Self::Equation {
                offset: extra,
                program: EquationProgram::default(),
            },
            code => {
                return Err(Error::UnknownEnumCode {
                    field: "channel type",
                    code,
                });
            }
        })
    }
}

/// One alarm threshold
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlarmLevel {
    /// Alarm when the reading rises above `level`
    pub hi: bool,
    /// Alarm when the reading falls below `level`
    pub lo: bool,
    /// Threshold in the channel's units
    pub level: f32,
    /// Digital outputs driven while the alarm is active
    pub digital_out_mask: u8,
}

impl AlarmLevel {
    /// Alarm above `level`
    #[must_use]
    pub const fn high(level: f32) -> Self {
        Self {
            hi: true,
            lo: false,
            level,
            digital_out_mask: 0,
        }
    }

    /// Alarm below `level`
    #[must_use]
    pub const fn low(level: f32) -> Self {
        Self {
            hi: false,
            lo: true,
            level,
            digital_out_mask: 0,
        }
    }

    /// Also drive digital output `bit` (0..=7)
    #[must_use]
    pub const fn with_digital_out(mut self, bit: u8) -> Self {
        self.digital_out_mask |= 1 << (bit & 7);
        self
    }

    const fn mode_bits(&self) -> u32 {
        let mut bits = 0;
        if self.hi {
            bits |= ALARM_HI;
        }
        if self.lo {
            bits |= ALARM_LO;
        }
        bits
    }
}

/// Alarm settings of a channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlarmConfig {
    /// Alarms on this channel can trigger scans
    pub use_as_trigger: bool,
    /// First threshold
    pub alarm1: AlarmLevel,
    /// Second threshold
    pub alarm2: AlarmLevel,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            use_as_trigger: true,
            alarm1: AlarmLevel::default(),
            alarm2: AlarmLevel::default(),
        }
    }
}

impl AlarmConfig {
    fn bits(&self) -> u32 {
        u32::from(self.use_as_trigger)
            | (self.alarm1.mode_bits() << ALARM1_SHIFT)
            | (self.alarm2.mode_bits() << ALARM2_SHIFT)
    }
}

/// Linear scaling applied by the instrument: `reading * multiplier + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    /// Gain
    pub multiplier: f32,
    /// Offset
    pub offset: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
        }
    }
}

/// Wire bits not explained by the typed fields
///
/// Each value is XOR-ed with the canonical encoding of the corresponding
/// word, so zero means "exactly what the typed fields produce". Decoding
/// fills these in; a record built from scratch leaves them zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreservedBits {
    /// Range word
    pub range: u32,
    /// First auxiliary word
    pub aux1: u32,
    /// Second auxiliary word
    pub aux2: u32,
    /// Extra word
    pub extra: u32,
    /// Alarm bits word
    pub alarm: u32,
    /// Alarm 1 digital output word
    pub alarm1_digital: u32,
    /// Alarm 2 digital output word
    pub alarm2_digital: u32,
}

/// Configuration of one channel
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelConfig {
    /// Measurement or computation
    pub kind: ChannelKind,
    /// Alarm thresholds
    pub alarm: AlarmConfig,
    /// mx+b scaling
    pub calibration: Calibration,
    /// Undocumented bits carried through unchanged
    pub preserved: PreservedBits,
}

impl ChannelConfig {
    /// Channel of the given kind with default alarm and scaling
    #[must_use]
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Disabled channel
    #[must_use]
    pub fn off() -> Self {
        Self::default()
    }

    /// Replace the alarm settings
    #[must_use]
    pub fn with_alarm(mut self, alarm: AlarmConfig) -> Self {
        self.alarm = alarm;
        self
    }

    /// Replace the mx+b scaling
    #[must_use]
    pub fn with_calibration(mut self, multiplier: f32, offset: f32) -> Self {
        self.calibration = Calibration { multiplier, offset };
        self
    }

    /// Parse a 48-byte record, rejecting unknown type or range codes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_inner(bytes, false)
    }

    /// Parse a 48-byte record, mapping unknown codes to
    /// [`ChannelKind::Unrecognized`]
    pub fn decode_lenient(bytes: &[u8]) -> Result<Self> {
        Self::decode_inner(bytes, true)
    }

    fn decode_inner(mut bytes: &[u8], lenient: bool) -> Result<Self> {
        ensure_len(bytes, CHANNEL_RECORD_SIZE, "channel record")?;

        let type_code = bytes.get_u32();
        let raw = [
            bytes.get_u32(),
            bytes.get_u32(),
            bytes.get_u32(),
            bytes.get_u32(),
        ];
        let alarm_bits = bytes.get_u32();
        let alarm1_level = bytes.get_f32();
        let alarm2_level = bytes.get_f32();
        let alarm1_digital = bytes.get_u32();
        let alarm2_digital = bytes.get_u32();
        let multiplier = bytes.get_f32();
        let offset = bytes.get_f32();

        let kind = match ChannelKind::decode(type_code, raw) {
            Ok(kind) => kind,
            Err(err) if lenient => {
                trace!(type_code, %err, "keeping channel record as unrecognized");
                ChannelKind::Unrecognized { type_code }
            }
            Err(err) => return Err(err),
        };

        let canonical = kind.words();
        let alarm = AlarmConfig {
            use_as_trigger: alarm_bits & ALARM_TRIGGER_BIT != 0,
            alarm1: AlarmLevel {
                hi: (alarm_bits >> ALARM1_SHIFT) & ALARM_HI != 0,
                lo: (alarm_bits >> ALARM1_SHIFT) & ALARM_LO != 0,
                level: alarm1_level,
                digital_out_mask: (alarm1_digital & 0xFF) as u8,
            },
            alarm2: AlarmLevel {
                hi: (alarm_bits >> ALARM2_SHIFT) & ALARM_HI != 0,
                lo: (alarm_bits >> ALARM2_SHIFT) & ALARM_LO != 0,
                level: alarm2_level,
                digital_out_mask: (alarm2_digital & 0xFF) as u8,
            },
        };

        let preserved = PreservedBits {
            range: raw[0] ^ canonical[0],
            aux1: raw[1] ^ canonical[1],
            aux2: raw[2] ^ canonical[2],
            extra: raw[3] ^ canonical[3],
            alarm: alarm_bits ^ alarm.bits(),
            alarm1_digital: alarm1_digital ^ u32::from(alarm.alarm1.digital_out_mask),
            alarm2_digital: alarm2_digital ^ u32::from(alarm.alarm2.digital_out_mask),
        };

        Ok(Self {
            kind,
            alarm,
            calibration: Calibration { multiplier, offset },
            preserved,
        })
    }

    /// Write the 48-byte record to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        let [range, aux1, aux2, extra] = self.kind.words();
        let p = &self.preserved;

        dst.put_u32(self.kind.type_code());
        dst.put_u32(range ^ p.range);
        dst.put_u32(aux1 ^ p.aux1);
        dst.put_u32(aux2 ^ p.aux2);
        dst.put_u32(extra ^ p.extra);
        dst.put_u32(self.alarm.bits() ^ p.alarm);
        dst.put_f32(self.alarm.alarm1.level);
        dst.put_f32(self.alarm.alarm2.level);
        dst.put_u32(u32::from(self.alarm.alarm1.digital_out_mask) ^ p.alarm1_digital);
        dst.put_u32(u32::from(self.alarm.alarm2.digital_out_mask) ^ p.alarm2_digital);
        dst.put_f32(self.calibration.multiplier);
        dst.put_f32(self.calibration.offset);
    }

    /// Convert to the 48-byte record
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CHANNEL_RECORD_SIZE] {
        let mut bytes = [0u8; CHANNEL_RECORD_SIZE];
        self.encode_into(&mut &mut bytes[..]);
        bytes
    }

    /// Check the settings against the instrument's documented limits
    ///
    /// Analog kinds belong on channels 1..=20 and computed kinds on 21..=30.
    pub fn validate(&self, channel: ChannelId) -> Result<()> {
        let invalid = |reason: &'static str| {
            Err(Error::InvalidChannelConfig {
                channel: channel.get(),
                reason,
            })
        };

        if self.kind.is_analog() && channel.is_computed() {
            return invalid("analog measurement on a computed channel");
        }
        if self.kind.is_computed() && !channel.is_computed() {
            return invalid("computed channel kind on an analog channel");
        }

        match self.kind {
            ChannelKind::Ohms2W {
                range: OhmsRange::R300 | OhmsRange::R3k,
            } => invalid("2-wire ohms is not supported on the 300 Ω and 3 kΩ ranges"),
            ChannelKind::Rtd { range, alpha, r0 } => {
                if !(10.0..=1010.0).contains(&r0) {
                    return invalid("RTD R0 must be between 10 and 1010 Ω");
                }
                match range {
                    RtdRange::Fixed385 if alpha != 0.0 => {
                        invalid("fixed RTD curve does not take an alpha")
                    }
                    RtdRange::Custom385 if !(0.00374..=0.00393).contains(&alpha) => {
                        invalid("custom RTD alpha must be between 0.00374 and 0.00393")
                    }
                    _ => Ok(()),
                }
            }
            ChannelKind::Current { shunt, .. } if !(10.0..=250.0).contains(&shunt) => {
                invalid("shunt resistance must be between 10 and 250 Ω")
            }
            _ => Ok(()),
        }
    }
}

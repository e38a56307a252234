//! Instrument status word

use std::fmt;

use bytes::Buf;

use super::ensure_len;
use crate::protocol::Result;

/// Response to [`Command::StatusQuery`](crate::Command::StatusQuery)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstrumentStatus(u32);

impl InstrumentStatus {
    /// Set while the instrument is still applying a previous command
    pub const BUSY: u32 = 0x8000_0000;

    /// Wrap a raw status word
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw status word
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the instrument is busy; callers poll until this clears
    #[must_use]
    pub const fn is_busy(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    /// Parse from a 4-byte payload
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, 4, "status word")?;
        Ok(Self(bytes.get_u32()))
    }
}

impl fmt::Display for InstrumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_busy() { "BUSY" } else { "IDLE" };
        write!(f, "{state} ({:#010x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_bit() {
        let busy = InstrumentStatus::decode(&[0x80, 0, 0, 0x01]).unwrap();
        assert!(busy.is_busy());
        assert_eq!(busy.to_string(), "BUSY (0x80000001)");
        assert!(!InstrumentStatus::from_raw(0x01).is_busy());
    }
}

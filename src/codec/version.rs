//! Version information string lists

use bytes::{BufMut, BytesMut};

/// NUL-separated strings returned by the version commands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionInfo {
    /// Raw entries, without terminators
    pub entries: Vec<Vec<u8>>,
    /// The last entry had no terminating NUL on the wire
    pub unterminated_tail: bool,
}

impl VersionInfo {
    /// Split a payload at every NUL byte
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let mut entries: Vec<Vec<u8>> = bytes
            .split(|&b| b == 0)
            .map(<[u8]>::to_vec)
            .collect();

        // `split` always yields a final piece: empty when the payload ended
        // with NUL (or was empty), otherwise an unterminated entry.
        let unterminated_tail = entries.last().is_some_and(|last| !last.is_empty());
        if !unterminated_tail {
            entries.pop();
        }

        Self {
            entries,
            unterminated_tail,
        }
    }

    /// Rebuild the wire form
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut dst = BytesMut::new();
        let count = self.entries.len();
        for (index, entry) in self.entries.iter().enumerate() {
            dst.put_slice(entry);
            if !(self.unterminated_tail && index + 1 == count) {
                dst.put_u8(0);
            }
        }
        dst
    }

    /// Entries as lossy UTF-8 strings
    #[must_use]
    pub fn strings(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_entries() {
        let payload = b"NetDAQ 2640A\0V2.1\0\0";
        let info = VersionInfo::decode(payload);
        assert_eq!(info.strings(), vec!["NetDAQ 2640A", "V2.1", ""]);
        assert!(!info.unterminated_tail);
        assert_eq!(info.encode().as_ref(), payload);
    }

    #[test]
    fn test_unterminated_tail() {
        let payload = b"A\0B";
        let info = VersionInfo::decode(payload);
        assert_eq!(info.strings(), vec!["A", "B"]);
        assert!(info.unterminated_tail);
        assert_eq!(info.encode().as_ref(), payload);
    }

    #[test]
    fn test_empty_payload() {
        let info = VersionInfo::decode(b"");
        assert!(info.entries.is_empty());
        assert!(info.encode().is_empty());
    }
}

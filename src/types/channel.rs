//! Logical channel identifiers embedded in wifibroadcast frames

use serde::{Deserialize, Serialize};
use std::fmt;

/// Purpose-tagged demultiplexing key carried by every link frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Elementary video stream (RTP H.264/H.265)
    Video,
    /// Secondary telemetry stream, forwarded opaque
    Telemetry,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Video, Channel::Telemetry];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Video => "video",
            Channel::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width channel id: `(link_id << 8) + radio_port`
///
/// Frames carry the id big-endian inside the receiver and transmitter
/// addresses, so comparison is done on the big-endian byte form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalChannelId(u32);

impl LogicalChannelId {
    /// Derive the id for a link and a per-purpose radio port.
    ///
    /// Only the low 24 bits of `link_id` survive the shift.
    pub const fn new(link_id: u32, radio_port: u8) -> Self {
        Self((link_id << 8).wrapping_add(radio_port as u32))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Byte-exact comparison against the id field of a frame
    pub fn matches(self, field: &[u8]) -> bool {
        field == self.to_be_bytes()
    }
}

impl fmt::Display for LogicalChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_link_ids() {
        let video = LogicalChannelId::new(7669206, 0x00);
        let telemetry = LogicalChannelId::new(7669206, 0x10);

        assert_eq!(video.raw(), 7669206 << 8);
        assert_eq!(telemetry.raw(), (7669206 << 8) + 0x10);
        assert_eq!(video.to_be_bytes(), [0x75, 0x05, 0xd6, 0x00]);
        assert_eq!(telemetry.to_be_bytes(), [0x75, 0x05, 0xd6, 0x10]);
    }

    #[test]
    fn matching_is_byte_exact() {
        let id = LogicalChannelId::from_raw(0x0102_0304);
        assert!(id.matches(&[1, 2, 3, 4]));
        assert!(!id.matches(&[4, 3, 2, 1]));
        assert!(!id.matches(&[1, 2, 3]));
        assert!(!id.matches(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn high_link_bits_are_dropped() {
        let id = LogicalChannelId::new(0xff00_0001, 0x10);
        assert_eq!(id.raw(), 0x0000_0110);
    }
}

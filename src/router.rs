//! Frame validator and channel router
//!
//! Every captured 802.11 frame is checked for the wifibroadcast layout
//! before its payload is handed to a per-channel aggregator:
//!
//! ```text
//! 0      2      4        6          10       12         16            24
//! +------+------+--------+----------+--------+----------+-- ... ------+---------+-----+
//! | 0801 | dur  | 'W''B' | id (BE)  | 'W''B' | id (BE)  | addr3/seq   | payload | FCS |
//! +------+------+--------+----------+--------+----------+-- ... ------+---------+-----+
//! ```
//!
//! Frames failing any check are dropped without an error; link noise is
//! frequent and expected.

use tracing::trace;

use crate::config::LinkConfig;
use crate::types::{CapturedFrame, Channel, LogicalChannelId, RadioMetadata};

/// 802.11 data header length
pub const IEEE80211_HEADER_LEN: usize = 24;
/// Trailing frame check sequence length
pub const FCS_LEN: usize = 4;
/// Frame control for a data frame sent to the distribution system
pub const FRAME_CONTROL: [u8; 2] = [0x08, 0x01];
/// Address prefix marking a wifibroadcast frame
pub const ADDRESS_MARKER: [u8; 2] = [0x57, 0x42];

const ADDR1_MARKER: std::ops::Range<usize> = 4..6;
const ADDR1_ID: std::ops::Range<usize> = 6..10;
const ADDR2_MARKER: std::ops::Range<usize> = 10..12;
const ADDR2_ID: std::ops::Range<usize> = 12..16;

/// A validated frame payload tagged with its logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutedPacket<'a> {
    pub channel: Channel,
    /// Frame body with the link-layer header and FCS removed
    pub payload: &'a [u8],
    pub metadata: &'a RadioMetadata,
    /// Sequence/retry counter; always 0
    pub sequence: u32,
}

/// Stateless router holding the static identifier table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRouter {
    video: LogicalChannelId,
    telemetry: LogicalChannelId,
}

impl ChannelRouter {
    pub fn new(video: LogicalChannelId, telemetry: LogicalChannelId) -> Self {
        Self { video, telemetry }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.channel_id(Channel::Video), config.channel_id(Channel::Telemetry))
    }

    pub fn channel_id(&self, channel: Channel) -> LogicalChannelId {
        match channel {
            Channel::Video => self.video,
            Channel::Telemetry => self.telemetry,
        }
    }

    /// Validate a frame and resolve its channel.
    ///
    /// Returns `None` for short frames, foreign frame control, missing
    /// address markers, mismatched receiver/transmitter ids and ids that
    /// belong to neither configured channel.
    pub fn route<'a>(&self, frame: &'a CapturedFrame) -> Option<RoutedPacket<'a>> {
        let data = frame.data.as_ref();
        if data.len() <= IEEE80211_HEADER_LEN + FCS_LEN {
            trace!(len = data.len(), "Dropping short frame");
            return None;
        }
        if data[..2] != FRAME_CONTROL {
            trace!("Dropping frame with foreign frame control {:02x?}", &data[..2]);
            return None;
        }
        if data[ADDR1_MARKER] != ADDRESS_MARKER || data[ADDR2_MARKER] != ADDRESS_MARKER {
            trace!("Dropping frame without wifibroadcast address marker");
            return None;
        }
        let id = &data[ADDR1_ID];
        if id != &data[ADDR2_ID] {
            trace!("Dropping frame with mismatched address ids");
            return None;
        }

        let channel = if self.video.matches(id) {
            Channel::Video
        } else if self.telemetry.matches(id) {
            Channel::Telemetry
        } else {
            trace!("Dropping frame for unknown channel id {:02x?}", id);
            return None;
        };

        Some(RoutedPacket {
            channel,
            payload: &data[IEEE80211_HEADER_LEN..data.len() - FCS_LEN],
            metadata: &frame.metadata,
            sequence: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_wfb_frame;
    use proptest::prelude::*;

    fn router() -> ChannelRouter {
        ChannelRouter::from_config(&LinkConfig::default())
    }

    #[test]
    fn routes_video_and_telemetry() {
        let router = router();
        let video = build_wfb_frame(router.channel_id(Channel::Video), b"video payload");
        let telemetry = build_wfb_frame(router.channel_id(Channel::Telemetry), b"mavlink");

        let packet = router.route(&video).unwrap();
        assert_eq!(packet.channel, Channel::Video);
        assert_eq!(packet.payload, b"video payload");
        assert_eq!(packet.sequence, 0);

        let packet = router.route(&telemetry).unwrap();
        assert_eq!(packet.channel, Channel::Telemetry);
        assert_eq!(packet.payload, b"mavlink");
    }

    #[test]
    fn rejects_structurally_invalid_frames() {
        let router = router();
        let id = router.channel_id(Channel::Video);

        // Header plus FCS with an empty body
        let empty = build_wfb_frame(id, b"");
        assert!(router.route(&empty).is_none());

        let mut bad_fc = build_wfb_frame(id, b"abc").data.to_vec();
        bad_fc[0] = 0x88;
        assert!(router.route(&CapturedFrame::new(bad_fc)).is_none());

        let mut bad_marker = build_wfb_frame(id, b"abc").data.to_vec();
        bad_marker[10] = 0x00;
        assert!(router.route(&CapturedFrame::new(bad_marker)).is_none());

        let mut mismatched = build_wfb_frame(id, b"abc").data.to_vec();
        mismatched[15] ^= 0xFF;
        assert!(router.route(&CapturedFrame::new(mismatched)).is_none());
    }

    #[test]
    fn metadata_is_forwarded() {
        let router = router();
        let mut frame = build_wfb_frame(router.channel_id(Channel::Video), b"x");
        frame.metadata.rssi = [-40, -42, 0, 0];
        frame.metadata.frequency_mhz = 5745;

        let packet = router.route(&frame).unwrap();
        assert_eq!(packet.metadata.rssi[1], -42);
        assert_eq!(packet.metadata.frequency_mhz, 5745);
    }

    proptest! {
        #[test]
        fn matching_ids_yield_stripped_payload(
            link_id in 0u32..0x0100_0000,
            payload in prop::collection::vec(any::<u8>(), 1..512),
            telemetry in any::<bool>()
        ) {
            let router = ChannelRouter::new(
                LogicalChannelId::new(link_id, 0x00),
                LogicalChannelId::new(link_id, 0x10),
            );
            let channel = if telemetry { Channel::Telemetry } else { Channel::Video };
            let frame = build_wfb_frame(router.channel_id(channel), &payload);

            let packet = router.route(&frame);
            prop_assert!(packet.is_some());
            let packet = packet.unwrap();
            prop_assert_eq!(packet.channel, channel);
            prop_assert_eq!(packet.payload, payload.as_slice());
        }

        #[test]
        fn foreign_ids_are_dropped(
            raw in any::<u32>(),
            payload in prop::collection::vec(any::<u8>(), 1..64)
        ) {
            let router = router();
            let id = LogicalChannelId::from_raw(raw);
            prop_assume!(id != router.channel_id(Channel::Video));
            prop_assume!(id != router.channel_id(Channel::Telemetry));

            prop_assert!(router.route(&build_wfb_frame(id, &payload)).is_none());
        }

        #[test]
        fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..128)) {
            let _ = router().route(&CapturedFrame::new(data));
        }
    }
}

//! Core types flowing through the receive pipeline.
//!
//! ## Architecture
//!
//! - [`CapturedFrame`] is a raw 802.11 frame straight from the radio capture
//! - [`LogicalChannelId`] / [`Channel`] demultiplex frames into video and telemetry
//! - [`Nalu`] is a reassembled, start-code-prefixed H.264/H.265 unit
//! - [`StatsSnapshot`] is the read model published by the statistics aggregator
//! - [`ChannelSelector`] tracks the operator's radio channel choice
//!
//! ## Usage Example
//!
//! ```rust
//! use fpvlink::types::{CodecFamily, Nalu, NaluKind};
//! use bytes::Bytes;
//!
//! let sps = Nalu::new(Bytes::from_static(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f]), CodecFamily::H264);
//! assert_eq!(sps.kind(), NaluKind::Sps);
//! assert!(sps.is_parameter_set());
//! ```

mod channel;
mod frame;
mod nalu;
mod radio;
mod stats;

pub use channel::{Channel, LogicalChannelId};
pub use frame::{CapturedFrame, RadioMetadata};
pub use nalu::{CodecFamily, Nalu, NaluKind, START_CODE};
pub use radio::{ChannelSelector, DEFAULT_CHANNELS};
pub use stats::StatsSnapshot;

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn classification_never_panics(header in any::<u8>(), second in any::<u8>(), tail in prop::collection::vec(any::<u8>(), 0..16)) {
            for family in [CodecFamily::H264, CodecFamily::H265] {
                let mut data = START_CODE.to_vec();
                data.push(header);
                data.push(second);
                data.extend_from_slice(&tail);
                let nalu = Nalu::new(Bytes::from(data), family);
                prop_assert_eq!(nalu.kind(), NaluKind::classify(family, header));
                prop_assert_eq!(nalu.payload().len(), nalu.len() - START_CODE.len());
            }
        }

        #[test]
        fn parameter_sets_are_exactly_vps_sps_pps(header in any::<u8>()) {
            for family in [CodecFamily::H264, CodecFamily::H265] {
                let kind = NaluKind::classify(family, header);
                let expected = matches!(kind, NaluKind::Vps | NaluKind::Sps | NaluKind::Pps);
                prop_assert_eq!(kind.is_parameter_set(), expected);
                if family == CodecFamily::H264 {
                    prop_assert_ne!(kind, NaluKind::Vps);
                }
            }
        }
    }

    #[test]
    fn snapshot_latency_sum() {
        let snapshot = StatsSnapshot {
            avg_parse_ms: 1.0,
            avg_wait_input_ms: 0.5,
            avg_decode_ms: 8.0,
            ..Default::default()
        };
        assert!((snapshot.total_latency_ms() - 9.5).abs() < f32::EPSILON);
    }
}

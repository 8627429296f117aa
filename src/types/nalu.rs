//! NAL unit types for H.264 and H.265 elementary streams

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Annex-B start code prefixed to every emitted unit
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Codec family of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecFamily {
    #[serde(rename = "h264", alias = "avc")]
    H264,
    #[serde(rename = "h265", alias = "hevc")]
    H265,
}

impl CodecFamily {
    /// Decoder MIME type for this family
    pub fn mime(self) -> &'static str {
        match self {
            CodecFamily::H264 => "video/avc",
            CodecFamily::H265 => "video/hevc",
        }
    }

    /// Parameter sets that must be cached before a decoder can be configured
    pub fn required_parameter_sets(self) -> &'static [NaluKind] {
        match self {
            CodecFamily::H264 => &[NaluKind::Sps, NaluKind::Pps],
            CodecFamily::H265 => &[NaluKind::Vps, NaluKind::Sps, NaluKind::Pps],
        }
    }

    /// Number of NAL header bytes for this family
    pub fn header_len(self) -> usize {
        match self {
            CodecFamily::H264 => 1,
            CodecFamily::H265 => 2,
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecFamily::H264 => f.write_str("H.264"),
            CodecFamily::H265 => f.write_str("H.265"),
        }
    }
}

/// Unit-type classification relevant to decoder bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaluKind {
    /// Video parameter set (H.265 only)
    Vps,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Instantaneous decoder refresh slice (keyframe)
    Idr,
    /// Anything else, carrying the raw type value
    Other(u8),
}

impl NaluKind {
    /// Classify a unit from its first NAL header byte
    pub fn classify(family: CodecFamily, header: u8) -> Self {
        match family {
            CodecFamily::H264 => match header & 0x1F {
                5 => NaluKind::Idr,
                7 => NaluKind::Sps,
                8 => NaluKind::Pps,
                n => NaluKind::Other(n),
            },
            CodecFamily::H265 => match (header >> 1) & 0x3F {
                19 | 20 => NaluKind::Idr,
                32 => NaluKind::Vps,
                33 => NaluKind::Sps,
                34 => NaluKind::Pps,
                n => NaluKind::Other(n),
            },
        }
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, NaluKind::Vps | NaluKind::Sps | NaluKind::Pps)
    }
}

/// A complete, start-code-prefixed NAL unit
#[derive(Debug, Clone)]
pub struct Nalu {
    data: Bytes,
    family: CodecFamily,
    kind: NaluKind,
    created_at: Instant,
}

impl Nalu {
    /// Wrap Annex-B data (start code included), stamping the creation time now
    pub fn new(data: Bytes, family: CodecFamily) -> Self {
        Self::with_timestamp(data, family, Instant::now())
    }

    pub fn with_timestamp(data: Bytes, family: CodecFamily, created_at: Instant) -> Self {
        let kind = match data.get(START_CODE.len()) {
            Some(&header) => NaluKind::classify(family, header),
            None => NaluKind::Other(0),
        };
        Self { data, family, kind, created_at }
    }

    /// Full unit including the start code
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Unit without the start code
    pub fn payload(&self) -> &[u8] {
        self.data.get(START_CODE.len()..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn family(&self) -> CodecFamily {
        self.family
    }

    pub fn kind(&self) -> NaluKind {
        self.kind
    }

    /// Parse-latency measurement point
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_parameter_set(&self) -> bool {
        self.kind.is_parameter_set()
    }

    pub fn is_keyframe(&self) -> bool {
        self.kind == NaluKind::Idr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(family: CodecFamily, header: &[u8]) -> Nalu {
        let mut data = START_CODE.to_vec();
        data.extend_from_slice(header);
        data.extend_from_slice(&[0xAA, 0xBB]);
        Nalu::new(Bytes::from(data), family)
    }

    #[test]
    fn h264_classification() {
        assert_eq!(unit(CodecFamily::H264, &[0x67]).kind(), NaluKind::Sps);
        assert_eq!(unit(CodecFamily::H264, &[0x68]).kind(), NaluKind::Pps);
        assert_eq!(unit(CodecFamily::H264, &[0x65]).kind(), NaluKind::Idr);
        assert_eq!(unit(CodecFamily::H264, &[0x41]).kind(), NaluKind::Other(1));
    }

    #[test]
    fn h265_classification() {
        assert_eq!(unit(CodecFamily::H265, &[0x40, 0x01]).kind(), NaluKind::Vps);
        assert_eq!(unit(CodecFamily::H265, &[0x42, 0x01]).kind(), NaluKind::Sps);
        assert_eq!(unit(CodecFamily::H265, &[0x44, 0x01]).kind(), NaluKind::Pps);
        assert_eq!(unit(CodecFamily::H265, &[0x26, 0x01]).kind(), NaluKind::Idr);
        assert_eq!(unit(CodecFamily::H265, &[0x02, 0x01]).kind(), NaluKind::Other(1));
    }

    #[test]
    fn payload_strips_start_code() {
        let nalu = unit(CodecFamily::H264, &[0x67]);
        assert_eq!(nalu.payload(), &[0x67, 0xAA, 0xBB]);
        assert_eq!(nalu.len(), 7);
        assert!(nalu.is_parameter_set());
        assert!(!nalu.is_keyframe());
    }

    #[test]
    fn short_units_do_not_panic() {
        let nalu = Nalu::new(Bytes::from_static(&[0, 0, 0]), CodecFamily::H265);
        assert_eq!(nalu.kind(), NaluKind::Other(0));
        assert!(nalu.payload().is_empty());
    }

    #[test]
    fn family_metadata() {
        assert_eq!(CodecFamily::H264.mime(), "video/avc");
        assert_eq!(CodecFamily::H265.mime(), "video/hevc");
        assert_eq!(CodecFamily::H265.required_parameter_sets().len(), 3);
        assert_eq!(CodecFamily::H264.header_len(), 1);
    }
}

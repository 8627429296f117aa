//! Captured radio frames

use bytes::Bytes;

/// Per-frame radio side data delivered with a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioMetadata {
    /// Antenna index per RF path
    pub antenna: [u8; 4],
    /// Signal strength per RF path in dBm
    pub rssi: [i8; 4],
    /// Noise floor per RF path in dBm
    pub noise: [i8; 4],
    /// Center frequency in MHz, 0 when unknown
    pub frequency_mhz: u32,
}

/// Raw link-layer frame as delivered by the capture layer
///
/// Ephemeral: it lives for one dispatch through the router and is never retained.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// 802.11 frame including header and trailing FCS
    pub data: Bytes,
    pub metadata: RadioMetadata,
}

impl CapturedFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), metadata: RadioMetadata::default() }
    }

    pub fn with_metadata(data: impl Into<Bytes>, metadata: RadioMetadata) -> Self {
        Self { data: data.into(), metadata }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

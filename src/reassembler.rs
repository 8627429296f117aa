//! NAL unit reassembly from RTP fragmentation units
//!
//! Two fragmentation encodings are recognized:
//!
//! - H.264 FU-A (RFC 6184): one indicator byte of type 28, then an FU header
//!   carrying the start/end flags and the original unit type.
//! - H.265 FU (RFC 7798): a two-byte payload header of type 49, then an FU
//!   header carrying the start/end flags and the original unit type.
//!
//! Anything else is a complete unit and is emitted as-is. Exactly one
//! fragmented unit is in flight at a time; a new start abandons the previous
//! accumulation.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::types::{CodecFamily, Nalu, START_CODE};

/// Largest unit the reassembler will emit, start code included
pub const DEFAULT_MAX_NAL_SIZE: usize = 3 * 1024 * 1024;

const H264_FU_A: u8 = 28;
const H265_FU: u8 = 49;

/// Drop and emit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Complete units emitted
    pub emitted: u64,
    /// Continuation/end fragments without an active start
    pub orphans_dropped: u64,
    /// Units that would have exceeded the size limit
    pub oversize_dropped: u64,
    /// Fragments too short to carry their headers
    pub malformed_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fragment {
    family: CodecFamily,
    start: bool,
    end: bool,
    /// Offset of the fragment payload past the FU headers
    payload_offset: usize,
}

/// Single-writer reassembly state
#[derive(Debug)]
pub struct Reassembler {
    buffer: BytesMut,
    in_progress: bool,
    family: CodecFamily,
    max_size: usize,
    stats: ReassemblerStats,
}

impl Reassembler {
    pub fn new(family: CodecFamily) -> Self {
        Self::with_max_size(family, DEFAULT_MAX_NAL_SIZE)
    }

    pub fn with_max_size(family: CodecFamily, max_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            in_progress: false,
            family,
            max_size,
            stats: ReassemblerStats::default(),
        }
    }

    /// Family of the most recent fragmentation unit (or the initial hint)
    pub fn family(&self) -> CodecFamily {
        self.family
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Bytes accumulated for the in-flight unit
    pub fn pending_len(&self) -> usize {
        if self.in_progress { self.buffer.len() } else { 0 }
    }

    /// Abandon any in-flight unit
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_progress = false;
    }

    /// Consume one depacketized fragment, returning a unit when one completes.
    pub fn on_fragment(&mut self, fragment: &[u8]) -> Option<Nalu> {
        if fragment.is_empty() {
            self.stats.malformed_dropped += 1;
            return None;
        }

        match self.classify(fragment) {
            Some(fu) => self.on_fragmentation_unit(fragment, fu),
            None if Self::fu_type_only(fragment) => {
                trace!(len = fragment.len(), "Dropping truncated fragmentation unit");
                self.stats.malformed_dropped += 1;
                None
            }
            None => self.on_single_unit(fragment),
        }
    }

    fn on_single_unit(&mut self, unit: &[u8]) -> Option<Nalu> {
        if self.in_progress {
            debug!(pending = self.buffer.len(), "Complete unit abandons in-flight fragments");
            self.reset();
        }
        if START_CODE.len() + unit.len() > self.max_size {
            debug!(len = unit.len(), max = self.max_size, "Dropping oversize unit");
            self.stats.oversize_dropped += 1;
            return None;
        }

        let mut data = BytesMut::with_capacity(START_CODE.len() + unit.len());
        data.put_slice(&START_CODE);
        data.put_slice(unit);
        self.emit(data)
    }

    fn on_fragmentation_unit(&mut self, fragment: &[u8], fu: Fragment) -> Option<Nalu> {
        let payload = &fragment[fu.payload_offset..];

        if fu.start {
            if self.in_progress {
                debug!(pending = self.buffer.len(), "New start fragment abandons in-flight unit");
            }
            self.buffer.clear();
            self.buffer.put_slice(&START_CODE);
            match fu.family {
                CodecFamily::H264 => {
                    self.buffer.put_u8((fragment[0] & 0xE0) | (fragment[1] & 0x1F));
                }
                CodecFamily::H265 => {
                    self.buffer.put_u8((fragment[0] & 0x81) | ((fragment[2] & 0x3F) << 1));
                    self.buffer.put_u8(fragment[1]);
                }
            }
            self.in_progress = true;
            self.family = fu.family;
        } else if !self.in_progress {
            trace!(end = fu.end, "Dropping fragment without an active start");
            self.stats.orphans_dropped += 1;
            return None;
        }

        if self.buffer.len() + payload.len() > self.max_size {
            debug!(
                pending = self.buffer.len(),
                incoming = payload.len(),
                max = self.max_size,
                "Dropping unit that would exceed capacity"
            );
            self.stats.oversize_dropped += 1;
            self.reset();
            return None;
        }
        self.buffer.put_slice(payload);

        if fu.end {
            self.in_progress = false;
            let data = self.buffer.split();
            return self.emit(data);
        }
        None
    }

    fn emit(&mut self, data: BytesMut) -> Option<Nalu> {
        self.stats.emitted += 1;
        let nalu = Nalu::new(data.freeze(), self.family);
        trace!(len = nalu.len(), kind = ?nalu.kind(), "Emitting NAL unit");
        Some(nalu)
    }

    /// Resolve a fragmentation unit, checking the active family first
    fn classify(&self, fragment: &[u8]) -> Option<Fragment> {
        let order = match self.family {
            CodecFamily::H264 => [CodecFamily::H264, CodecFamily::H265],
            CodecFamily::H265 => [CodecFamily::H265, CodecFamily::H264],
        };
        order.into_iter().find_map(|family| Self::parse_fu(family, fragment))
    }

    fn parse_fu(family: CodecFamily, fragment: &[u8]) -> Option<Fragment> {
        match family {
            CodecFamily::H264 if fragment.len() >= 2 && fragment[0] & 0x1F == H264_FU_A => {
                Some(Fragment {
                    family,
                    start: fragment[1] & 0x80 != 0,
                    end: fragment[1] & 0x40 != 0,
                    payload_offset: 2,
                })
            }
            CodecFamily::H265 if fragment.len() >= 3 && (fragment[0] >> 1) & 0x3F == H265_FU => {
                Some(Fragment {
                    family,
                    start: fragment[2] & 0x80 != 0,
                    end: fragment[2] & 0x40 != 0,
                    payload_offset: 3,
                })
            }
            _ => None,
        }
    }

    /// Carries a fragmentation type but is too short for its FU header
    fn fu_type_only(fragment: &[u8]) -> bool {
        fragment[0] & 0x1F == H264_FU_A || (fragment[0] >> 1) & 0x3F == H265_FU
    }
}

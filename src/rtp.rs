//! RTP fixed-header parsing (RFC 3550)
//!
//! Video packets leave the aggregator as RTP; only the header fields needed
//! for diagnostics are kept, the payload goes straight to the reassembler.

/// Minimum RTP header length
pub const RTP_HEADER_LEN: usize = 12;
const RTP_VERSION: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// Parse an RTP packet into its header and payload slice.
///
/// Returns `None` for a wrong version, a truncated header, CSRC list or
/// extension, or a padding count that exceeds the payload.
pub fn parse(packet: &[u8]) -> Option<(RtpHeader, &[u8])> {
    if packet.len() < RTP_HEADER_LEN {
        return None;
    }

    let first = packet[0];
    if first >> 6 != RTP_VERSION {
        return None;
    }
    let padding = first & 0x20 != 0;
    let extension = first & 0x10 != 0;
    let csrc_count = (first & 0x0F) as usize;

    let header = RtpHeader {
        marker: packet[1] & 0x80 != 0,
        payload_type: packet[1] & 0x7F,
        sequence: u16::from_be_bytes([packet[2], packet[3]]),
        timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
        ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
    };

    let mut offset = RTP_HEADER_LEN + csrc_count * 4;
    if extension {
        let ext = packet.get(offset..offset + 4)?;
        let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
        offset += 4 + words * 4;
    }
    if offset > packet.len() {
        return None;
    }

    let mut end = packet.len();
    if padding {
        let pad = packet[end - 1] as usize;
        if pad == 0 || offset + pad > end {
            return None;
        }
        end -= pad;
    }

    Some((header, &packet[offset..end]))
}

/// Payload of an RTP packet, dropping the header
pub fn payload(packet: &[u8]) -> Option<&[u8]> {
    parse(packet).map(|(_, payload)| payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::rtp_wrap;
    use proptest::prelude::*;

    #[test]
    fn parses_fixed_header() {
        let packet = rtp_wrap(0x1234, true, &[0x65, 0x88, 0x80]);
        let (header, body) = parse(&packet).unwrap();
        assert!(header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence, 0x1234);
        assert_eq!(body, &[0x65, 0x88, 0x80]);
    }

    #[test]
    fn skips_csrcs_and_extension() {
        let mut packet = vec![0x80 | 0x10 | 0x02, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        packet.extend_from_slice(&[0; 8]); // two CSRCs
        packet.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4]); // one-word extension
        packet.extend_from_slice(b"nal");
        assert_eq!(payload(&packet), Some(&b"nal"[..]));
    }

    #[test]
    fn trims_padding() {
        let mut packet = vec![0x80 | 0x20, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        packet.extend_from_slice(b"nal");
        packet.extend_from_slice(&[0, 0, 3]);
        assert_eq!(payload(&packet), Some(&b"nal"[..]));
    }

    #[test]
    fn rejects_malformed_packets() {
        assert!(payload(&[0x80, 96, 0]).is_none());
        // Version 1
        assert!(payload(&[0x40, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0x65]).is_none());
        // Fifteen CSRCs declared, none present
        assert!(payload(&[0x8F, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]).is_none());
        // Padding longer than the packet body
        assert!(payload(&[0xA0, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0x65, 40]).is_none());
        // Extension header cut short
        assert!(payload(&[0x90, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0xBE]).is_none());
    }

    proptest! {
        #[test]
        fn never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
            if let Some((_, body)) = parse(&data) {
                prop_assert!(body.len() <= data.len());
            }
        }

        #[test]
        fn wrapped_payload_survives(seq in any::<u16>(), body in prop::collection::vec(any::<u8>(), 0..256)) {
            let packet = rtp_wrap(seq, false, &body);
            let (header, parsed) = parse(&packet).unwrap();
            prop_assert_eq!(header.sequence, seq);
            prop_assert_eq!(parsed, body.as_slice());
        }
    }
}

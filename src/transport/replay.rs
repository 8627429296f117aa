//! Pcap replay transport
//!
//! Replays a recorded monitor-mode capture through the live pipeline.
//! Classic pcap files with link type 105 (raw 802.11) or 127 (radiotap +
//! 802.11) are supported; radiotap headers are skipped.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use fpvlink::transport::PcapReader;
//!
//! fn count_frames() -> fpvlink::Result<()> {
//!     let mut reader = PcapReader::open("flight.pcap")?;
//!     let mut frames = 0;
//!     while let Some(_record) = reader.next_record()? {
//!         frames += 1;
//!     }
//!     println!("{} frames", frames);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::{CaptureSource, Transport};
use crate::types::CapturedFrame;
use crate::{LinkError, Result};

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
/// Largest record accepted; bigger lengths mean a corrupt file
const MAX_RECORD_LEN: usize = 262_144;

pub const LINKTYPE_IEEE802_11: u32 = 105;
pub const LINKTYPE_IEEE802_11_RADIOTAP: u32 = 127;

/// One captured frame and its capture-relative timestamp
#[derive(Debug, Clone)]
pub struct PcapRecord {
    pub timestamp: Duration,
    pub frame: CapturedFrame,
}

/// In-memory reader for classic pcap captures
#[derive(Debug)]
pub struct PcapReader {
    data: Bytes,
    position: usize,
    big_endian: bool,
    nanos: bool,
    link_type: u32,
    records_read: usize,
}

impl PcapReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| LinkError::io_error(path, e))?;
        Self::from_bytes(Bytes::from(data))
    }

    pub fn from_bytes(data: Bytes) -> Result<Self> {
        if data.len() < GLOBAL_HEADER_LEN {
            return Err(LinkError::capture("pcap header", "file shorter than global header"));
        }

        let magic = [data[0], data[1], data[2], data[3]];
        let (big_endian, nanos) = match (u32::from_le_bytes(magic), u32::from_be_bytes(magic)) {
            (MAGIC_MICROS, _) => (false, false),
            (MAGIC_NANOS, _) => (false, true),
            (_, MAGIC_MICROS) => (true, false),
            (_, MAGIC_NANOS) => (true, true),
            _ => {
                return Err(LinkError::capture(
                    "pcap header",
                    format!("unrecognized magic {:02x?}", magic),
                ));
            }
        };

        let mut reader =
            Self { data, position: GLOBAL_HEADER_LEN, big_endian, nanos, link_type: 0, records_read: 0 };
        reader.link_type = reader.read_u32(20);

        match reader.link_type {
            LINKTYPE_IEEE802_11 | LINKTYPE_IEEE802_11_RADIOTAP => {}
            other => {
                return Err(LinkError::capture(
                    "pcap header",
                    format!("unsupported link type {}", other),
                ));
            }
        }

        debug!(
            link_type = reader.link_type,
            big_endian, nanos, "Opened pcap capture ({} bytes)", reader.data.len()
        );
        Ok(reader)
    }

    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let bytes = [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ];
        if self.big_endian { u32::from_be_bytes(bytes) } else { u32::from_le_bytes(bytes) }
    }

    /// Read the next record; `None` at a clean end of file
    pub fn next_record(&mut self) -> Result<Option<PcapRecord>> {
        loop {
            let remaining = self.data.len() - self.position;
            if remaining == 0 {
                return Ok(None);
            }
            if remaining < RECORD_HEADER_LEN {
                return Err(LinkError::capture("pcap record", "truncated record header"));
            }

            let header = self.position;
            let ts_sec = self.read_u32(header);
            let ts_frac = self.read_u32(header + 4);
            let incl_len = self.read_u32(header + 8) as usize;
            if incl_len > MAX_RECORD_LEN {
                return Err(LinkError::capture(
                    "pcap record",
                    format!("record length {} exceeds {}", incl_len, MAX_RECORD_LEN),
                ));
            }

            let start = header + RECORD_HEADER_LEN;
            let end = start + incl_len;
            if end > self.data.len() {
                return Err(LinkError::capture("pcap record", "truncated record body"));
            }
            self.position = end;
            self.records_read += 1;

            let timestamp = if self.nanos {
                Duration::new(ts_sec as u64, ts_frac.min(999_999_999))
            } else {
                Duration::new(ts_sec as u64, ts_frac.min(999_999) * 1000)
            };

            let body = self.data.slice(start..end);
            let Some(frame) = self.strip_link_header(body) else {
                trace!(record = self.records_read, "Skipping record with bad radiotap header");
                continue;
            };
            return Ok(Some(PcapRecord { timestamp, frame: CapturedFrame::new(frame) }));
        }
    }

    fn strip_link_header(&self, body: Bytes) -> Option<Bytes> {
        if self.link_type != LINKTYPE_IEEE802_11_RADIOTAP {
            return Some(body);
        }
        if body.len() < 4 {
            return None;
        }
        // Radiotap length is little-endian regardless of file byte order
        let len = u16::from_le_bytes([body[2], body[3]]) as usize;
        if len < 4 || len > body.len() {
            return None;
        }
        Some(body.slice(len..))
    }
}

/// Transport that replays a pcap file instead of tuning a radio
#[derive(Debug, Clone)]
pub struct PcapTransport {
    path: PathBuf,
    playback_speed: Option<f64>,
}

impl PcapTransport {
    /// Replay as fast as the pipeline consumes frames
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), playback_speed: None }
    }

    /// Pace frames by their capture timestamps (1.0 = recorded speed)
    pub fn with_playback_speed(mut self, speed: f64) -> Self {
        self.playback_speed = Some(speed.clamp(0.1, 10.0));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Transport for PcapTransport {
    async fn open(&self, radio_channel: u16) -> Result<Box<dyn CaptureSource>> {
        let path = self.path.clone();
        let reader = tokio::task::spawn_blocking(move || PcapReader::open(path))
            .await
            .map_err(|e| LinkError::transport_failed_with_source("pcap reader task", Box::new(e)))??;

        info!(
            radio_channel,
            path = %self.path.display(),
            "Replaying capture (radio channel ignored)"
        );
        Ok(Box::new(PcapSource {
            reader,
            speed: self.playback_speed,
            pending: None,
            clock: None,
        }))
    }
}

struct PcapSource {
    reader: PcapReader,
    speed: Option<f64>,
    /// Record read but not yet returned, kept across a cancelled pacing wait
    pending: Option<PcapRecord>,
    /// First capture timestamp and the instant it was replayed
    clock: Option<(Duration, Instant)>,
}

#[async_trait]
impl CaptureSource for PcapSource {
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        if self.pending.is_none() {
            self.pending = self.reader.next_record()?;
        }
        let Some(record) = self.pending.as_ref() else {
            debug!("Capture replay finished after {} records", self.reader.records_read());
            return Ok(None);
        };

        if let Some(speed) = self.speed {
            let (first, started) = *self.clock.get_or_insert((record.timestamp, Instant::now()));
            let offset = record.timestamp.saturating_sub(first).div_f64(speed);
            tokio::time::sleep_until(started + offset).await;
        }

        Ok(self.pending.take().map(|record| record.frame))
    }

    async fn close(&mut self) {
        debug!("Closing capture replay");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::pcap_file;

    fn frame(fill: u8, len: usize) -> Vec<u8> {
        vec![fill; len]
    }

    #[test]
    fn reads_raw_80211_records() {
        let records = [(Duration::from_millis(0), frame(1, 40)), (Duration::from_millis(5), frame(2, 60))];
        let mut reader = PcapReader::from_bytes(pcap_file(LINKTYPE_IEEE802_11, &records)).unwrap();

        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.frame.len(), 40);
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.timestamp, Duration::from_millis(5));
        assert_eq!(second.frame.data[0], 2);
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.records_read(), 2);
    }

    #[test]
    fn strips_radiotap_header() {
        let mut body = vec![0x00, 0x00, 0x08, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
        body.extend_from_slice(&frame(7, 30));
        let records = [(Duration::ZERO, body)];
        let mut reader =
            PcapReader::from_bytes(pcap_file(LINKTYPE_IEEE802_11_RADIOTAP, &records)).unwrap();

        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.frame.data.as_ref(), frame(7, 30).as_slice());
    }

    #[test]
    fn skips_bad_radiotap_records() {
        let records = [
            (Duration::ZERO, vec![0x00, 0x00, 0xFF, 0x00, 1, 2]),
            (Duration::ZERO, vec![0x00, 0x00, 0x04, 0x00, 9]),
        ];
        let mut reader =
            PcapReader::from_bytes(pcap_file(LINKTYPE_IEEE802_11_RADIOTAP, &records)).unwrap();
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.frame.data.as_ref(), &[9]);
    }

    #[test]
    fn big_endian_files_are_supported() {
        let mut file = pcap_file(LINKTYPE_IEEE802_11, &[(Duration::from_secs(1), frame(3, 32))]).to_vec();
        // Rewrite every header field big-endian
        for range in [0..4, 20..24, 24..28, 28..32, 32..36, 36..40] {
            file[range].reverse();
        }
        file[4..6].reverse();
        file[6..8].reverse();
        let mut reader = PcapReader::from_bytes(Bytes::from(file)).unwrap();
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.timestamp, Duration::from_secs(1));
        assert_eq!(record.frame.len(), 32);
    }

    #[test]
    fn rejects_invalid_files() {
        assert!(PcapReader::from_bytes(Bytes::from_static(&[0xd4, 0xc3])).is_err());

        let mut bad_magic = pcap_file(LINKTYPE_IEEE802_11, &[]).to_vec();
        bad_magic[0] = 0;
        assert!(matches!(
            PcapReader::from_bytes(Bytes::from(bad_magic)),
            Err(LinkError::Capture { .. })
        ));

        assert!(PcapReader::from_bytes(pcap_file(1, &[])).is_err());

        let mut truncated = pcap_file(LINKTYPE_IEEE802_11, &[(Duration::ZERO, frame(0, 50))]).to_vec();
        truncated.truncate(truncated.len() - 10);
        let mut reader = PcapReader::from_bytes(Bytes::from(truncated)).unwrap();
        assert!(reader.next_record().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn paced_replay_follows_timestamps() {
        let records = [
            (Duration::from_secs(10), frame(1, 30)),
            (Duration::from_millis(10_500), frame(2, 30)),
        ];
        let mut source = PcapSource {
            reader: PcapReader::from_bytes(pcap_file(LINKTYPE_IEEE802_11, &records)).unwrap(),
            speed: Some(1.0),
            pending: None,
            clock: None,
        };

        let start = Instant::now();
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(start.elapsed() < Duration::from_millis(1));
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transport_reports_missing_file() {
        let transport = PcapTransport::new("/nonexistent/flight.pcap");
        let err = transport.open(149).await.err().unwrap();
        assert!(matches!(err, LinkError::Io { .. }));
    }
}

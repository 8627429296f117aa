//! Test doubles and stream builders
//!
//! Stand-ins for the hardware decoder and the radio transport, plus helpers
//! that build wifibroadcast frames, RTP packets, fragmentation units and pcap
//! files. Shared by unit tests and the benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::decoder::{
    DecoderFactory, HardwareDecoder, InputSlot, InputStatus, OutputBuffer, OutputStatus, VideoRatio,
};
use crate::keyframe::CodecConfig;
use crate::router::{ADDRESS_MARKER, FCS_LEN, FRAME_CONTROL, IEEE80211_HEADER_LEN};
use crate::transport::{CaptureSource, Transport};
use crate::types::{CapturedFrame, CodecFamily, LogicalChannelId, Nalu, START_CODE};
use crate::{LinkError, Result};

/// H.264 baseline SPS
pub const H264_SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE8];
pub const H264_PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
pub const H264_IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33, 0xFF, 0x10, 0x20];
pub const H264_SLICE: &[u8] = &[0x41, 0x9A, 0x02, 0x04, 0x08];

pub const H265_VPS: &[u8] = &[0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF];
pub const H265_SPS: &[u8] = &[0x42, 0x01, 0x01, 0x01, 0x60, 0x00];
pub const H265_PPS: &[u8] = &[0x44, 0x01, 0xC1, 0x72, 0xB4];
pub const H265_IDR: &[u8] = &[0x26, 0x01, 0xAF, 0x06, 0xB8, 0x63];

/// Start-code-prefix a unit and wrap it as a `Nalu`
pub fn nalu(family: CodecFamily, unit: &[u8]) -> Nalu {
    let mut data = BytesMut::with_capacity(START_CODE.len() + unit.len());
    data.put_slice(&START_CODE);
    data.put_slice(unit);
    Nalu::new(data.freeze(), family)
}

/// Build an 802.11 data frame carrying `payload` on channel `id`
pub fn build_wfb_frame(id: LogicalChannelId, payload: &[u8]) -> CapturedFrame {
    let mut data = BytesMut::with_capacity(IEEE80211_HEADER_LEN + payload.len() + FCS_LEN);
    data.put_slice(&FRAME_CONTROL);
    data.put_slice(&[0x00, 0x00]); // duration
    data.put_slice(&ADDRESS_MARKER);
    data.put_slice(&id.to_be_bytes());
    data.put_slice(&ADDRESS_MARKER);
    data.put_slice(&id.to_be_bytes());
    data.put_bytes(0, IEEE80211_HEADER_LEN - 16); // addr3 + sequence control
    data.put_slice(payload);
    data.put_bytes(0, FCS_LEN);
    CapturedFrame::new(data.freeze())
}

/// Prefix a payload with a minimal RTP header (payload type 96)
pub fn rtp_wrap(sequence: u16, marker: bool, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(12 + payload.len());
    packet.push(0x80);
    packet.push(if marker { 0x80 | 96 } else { 96 });
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(&90_000u32.to_be_bytes());
    packet.extend_from_slice(&0x1234_5678u32.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

fn fragments(headers: &[u8], fu_type: u8, payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![payload]
    } else {
        payload.chunks(chunk.max(1)).collect()
    };
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            let mut fu = fu_type;
            if i == 0 {
                fu |= 0x80;
            }
            if i == last {
                fu |= 0x40;
            }
            let mut fragment = headers.to_vec();
            fragment.push(fu);
            fragment.extend_from_slice(body);
            fragment
        })
        .collect()
}

/// Split an H.264 unit into FU-A fragments of at most `chunk` payload bytes
pub fn fu_fragments_h264(unit: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let indicator = (unit[0] & 0xE0) | 28;
    fragments(&[indicator], unit[0] & 0x1F, &unit[1..], chunk)
}

/// Split an H.265 unit into FU fragments of at most `chunk` payload bytes
pub fn fu_fragments_h265(unit: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let header = [(unit[0] & 0x81) | (49 << 1), unit[1]];
    fragments(&header, (unit[0] >> 1) & 0x3F, &unit[2..], chunk)
}

/// Wrap fragments as RTP packets inside video frames for channel `id`
pub fn video_frames(id: LogicalChannelId, fragments: &[Vec<u8>]) -> Vec<CapturedFrame> {
    fragments
        .iter()
        .enumerate()
        .map(|(seq, fragment)| {
            let packet = rtp_wrap(seq as u16, false, fragment);
            build_wfb_frame(id, &packet)
        })
        .collect()
}

/// Little-endian, microsecond-resolution pcap file
pub fn pcap_file(link_type: u32, records: &[(Duration, Vec<u8>)]) -> Bytes {
    let mut file = BytesMut::new();
    file.put_u32_le(0xa1b2_c3d4);
    file.put_u16_le(2);
    file.put_u16_le(4);
    file.put_i32_le(0);
    file.put_u32_le(0);
    file.put_u32_le(65_535);
    file.put_u32_le(link_type);
    for (timestamp, body) in records {
        file.put_u32_le(timestamp.as_secs() as u32);
        file.put_u32_le(timestamp.subsec_micros());
        file.put_u32_le(body.len() as u32);
        file.put_u32_le(body.len() as u32);
        file.put_slice(body);
    }
    file.freeze()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the mock hands out input slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Available { capacity: usize },
    /// Every request waits out its timeout and reports try-again
    AlwaysTryAgain,
}

/// A unit submitted to the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedInput {
    pub data: Bytes,
    pub timestamp_us: u64,
}

#[derive(Debug)]
struct MockState {
    input_mode: InputMode,
    echo: bool,
    next_slot: usize,
    next_output: usize,
    config: Option<CodecConfig>,
    fail_configure: bool,
    started: bool,
    stopped: bool,
    released: bool,
    queued: Vec<QueuedInput>,
    outputs: VecDeque<OutputStatus>,
    released_outputs: Vec<(usize, Instant)>,
    /// Ratios applied as their format-change statuses are dequeued
    formats: VecDeque<VideoRatio>,
    ratio: VideoRatio,
}

/// Scriptable in-memory codec.
///
/// With echo enabled every queued input comes back as one decoded output
/// buffer carrying the same bytes and timestamp.
#[derive(Debug)]
pub struct MockDecoder {
    state: Mutex<MockState>,
    output_ready: Notify,
}

impl MockDecoder {
    pub fn new(input_mode: InputMode) -> Self {
        Self {
            state: Mutex::new(MockState {
                input_mode,
                echo: true,
                next_slot: 0,
                next_output: 0,
                config: None,
                fail_configure: false,
                started: false,
                stopped: false,
                released: false,
                queued: Vec::new(),
                outputs: VecDeque::new(),
                released_outputs: Vec::new(),
                formats: VecDeque::new(),
                ratio: VideoRatio::default(),
            }),
            output_ready: Notify::new(),
        }
    }

    pub fn set_input_mode(&self, mode: InputMode) {
        lock(&self.state).input_mode = mode;
    }

    pub fn set_echo(&self, echo: bool) {
        lock(&self.state).echo = echo;
    }

    pub fn fail_configure(&self) {
        lock(&self.state).fail_configure = true;
    }

    /// Queue a raw output status for the drain task
    pub fn push_output(&self, status: OutputStatus) {
        lock(&self.state).outputs.push_back(status);
        self.output_ready.notify_one();
    }

    /// Change the output dimensions and signal a format change
    pub fn set_ratio(&self, ratio: VideoRatio) {
        lock(&self.state).formats.push_back(ratio);
        self.push_output(OutputStatus::FormatChanged);
    }

    pub fn queued(&self) -> Vec<QueuedInput> {
        lock(&self.state).queued.clone()
    }

    pub fn released_outputs(&self) -> Vec<(usize, Instant)> {
        lock(&self.state).released_outputs.clone()
    }

    pub fn config(&self) -> Option<CodecConfig> {
        lock(&self.state).config.clone()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.state).stopped
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }
}

#[async_trait]
impl HardwareDecoder for MockDecoder {
    fn configure(&self, config: &CodecConfig) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_configure {
            return Err(LinkError::decoder_config(config.mime, "mock rejected format"));
        }
        state.config = Some(config.clone());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        lock(&self.state).started = true;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        lock(&self.state).stopped = true;
        self.output_ready.notify_one();
        Ok(())
    }

    fn release(&self) {
        lock(&self.state).released = true;
    }

    async fn dequeue_input(&self, timeout: Duration) -> InputStatus {
        {
            let mut state = lock(&self.state);
            if state.stopped {
                return InputStatus::Error(-38);
            }
            if let InputMode::Available { capacity } = state.input_mode {
                let index = state.next_slot;
                state.next_slot += 1;
                return InputStatus::Ready(InputSlot { index, capacity });
            }
        }
        tokio::time::sleep(timeout).await;
        InputStatus::TryAgain
    }

    fn queue_input(&self, slot: InputSlot, data: &[u8], timestamp_us: u64) -> Result<()> {
        let mut state = lock(&self.state);
        if data.len() > slot.capacity {
            return Err(LinkError::decoder_fault("queue_input", -22));
        }
        let data = Bytes::copy_from_slice(data);
        state.queued.push(QueuedInput { data: data.clone(), timestamp_us });
        if state.echo && !data.is_empty() {
            let index = state.next_output;
            state.next_output += 1;
            state.outputs.push_back(OutputStatus::Buffer(OutputBuffer {
                index,
                data,
                presentation_time_us: timestamp_us,
                end_of_stream: false,
            }));
            drop(state);
            self.output_ready.notify_one();
        }
        Ok(())
    }

    async fn dequeue_output(&self, timeout: Duration) -> OutputStatus {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = lock(&self.state);
                if let Some(status) = state.outputs.pop_front() {
                    if status == OutputStatus::FormatChanged {
                        if let Some(ratio) = state.formats.pop_front() {
                            state.ratio = ratio;
                        }
                    }
                    return status;
                }
                if state.stopped {
                    return OutputStatus::Error(-10000);
                }
            }
            if tokio::time::timeout_at(deadline, self.output_ready.notified()).await.is_err() {
                return OutputStatus::TryAgain;
            }
        }
    }

    fn release_output(&self, index: usize, release_at: Instant) {
        lock(&self.state).released_outputs.push((index, release_at));
    }

    fn output_format(&self) -> VideoRatio {
        lock(&self.state).ratio
    }
}

/// Hands out [`MockDecoder`]s and remembers them
#[derive(Debug)]
pub struct MockDecoderFactory {
    input_mode: InputMode,
    fail_next: AtomicUsize,
    fail_configure: AtomicBool,
    created: Mutex<Vec<Arc<MockDecoder>>>,
}

impl MockDecoderFactory {
    pub fn new(input_mode: InputMode) -> Self {
        Self {
            input_mode,
            fail_next: AtomicUsize::new(0),
            fail_configure: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Decoders with plenty of input capacity
    pub fn available() -> Self {
        Self::new(InputMode::Available { capacity: 1 << 20 })
    }

    /// Fail the next `count` creation requests
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Make every new decoder reject its configuration
    pub fn fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        lock(&self.created).len()
    }

    pub fn last(&self) -> Option<Arc<MockDecoder>> {
        lock(&self.created).last().cloned()
    }
}

impl DecoderFactory for MockDecoderFactory {
    fn create(&self, mime: &str) -> Result<Arc<dyn HardwareDecoder>> {
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(LinkError::decoder_config(mime, "no decoder available"));
        }
        let decoder = Arc::new(MockDecoder::new(self.input_mode));
        if self.fail_configure.load(Ordering::SeqCst) {
            decoder.fail_configure();
        }
        lock(&self.created).push(decoder.clone());
        Ok(decoder)
    }
}

#[derive(Debug, Default)]
struct TransportLog {
    opened: Mutex<Vec<u16>>,
    closed: AtomicUsize,
}

/// Transport that replays a fixed list of frames on every open
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    frames: Vec<CapturedFrame>,
    hold_open: bool,
    fail_open: Arc<AtomicBool>,
    log: Arc<TransportLog>,
}

impl ScriptedTransport {
    pub fn new(frames: Vec<CapturedFrame>) -> Self {
        Self {
            frames,
            hold_open: false,
            fail_open: Arc::new(AtomicBool::new(false)),
            log: Arc::new(TransportLog::default()),
        }
    }

    /// Keep sources pending after the script instead of ending them
    pub fn holding_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened_channels(&self) -> Vec<u16> {
        lock(&self.log.opened).clone()
    }

    pub fn close_count(&self) -> usize {
        self.log.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, radio_channel: u16) -> Result<Box<dyn CaptureSource>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(LinkError::transport_failed(format!(
                "cannot claim adapter for channel {}",
                radio_channel
            )));
        }
        lock(&self.log.opened).push(radio_channel);
        Ok(Box::new(ScriptedSource {
            frames: self.frames.iter().cloned().collect(),
            hold_open: self.hold_open,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedSource {
    frames: VecDeque<CapturedFrame>,
    hold_open: bool,
    log: Arc<TransportLog>,
}

#[async_trait]
impl CaptureSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        // Let other tasks run between frames, like a real adapter read
        tokio::task::yield_now().await;
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn close(&mut self) {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

//! Hardware decoder driving
//!
//! The codec device itself is behind [`HardwareDecoder`]; this module owns
//! its lifecycle. [`DecoderDriver`] feeds reassembled units under
//! backpressure and a dedicated drain task pulls decoded output, handing
//! frames, ratio changes and statistics to the consumer as [`DecoderEvent`]s
//! over a bounded channel.
//!
//! ```text
//! Uninitialized --init--> AwaitingConfig --parameter sets--> Configuring --> Running
//!       ^                        ^                               |             |
//!       |                        +-------- configure failed -----+             | EOS / fault
//!       |                                                                      v
//!       +------------------------------ deinit ------------------ Stopped <- Stopping
//! ```

mod drain;
mod driver;

pub use driver::{DecoderChannels, DecoderDriver, FeedOutcome};

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::keyframe::CodecConfig;
use crate::types::StatsSnapshot;
use crate::Result;

/// An input buffer handed out by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub index: usize,
    pub capacity: usize,
}

/// Result of a bounded wait for an input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Ready(InputSlot),
    /// No buffer became free within the timeout
    TryAgain,
    /// Any other status code from the device
    Error(i32),
}

/// A decoded output buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    pub index: usize,
    pub data: Bytes,
    /// Timestamp the matching input was submitted with
    pub presentation_time_us: u64,
    pub end_of_stream: bool,
}

/// Result of a bounded wait for decoded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStatus {
    Buffer(OutputBuffer),
    FormatChanged,
    BuffersChanged,
    TryAgain,
    /// Unknown or negative status; treated as unrecoverable
    Error(i32),
}

/// Decoded picture dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VideoRatio {
    pub width: u32,
    pub height: u32,
}

impl VideoRatio {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_known(&self) -> bool {
        self.width != 0 && self.height != 0
    }
}

impl fmt::Display for VideoRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A stateful hardware codec device.
///
/// Every wait takes an explicit timeout; implementations must return
/// `TryAgain` rather than block past it.
#[async_trait]
pub trait HardwareDecoder: Send + Sync + 'static {
    fn configure(&self, config: &CodecConfig) -> Result<()>;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Free the device; the handle is not used afterwards
    fn release(&self);

    async fn dequeue_input(&self, timeout: Duration) -> InputStatus;

    /// Copy `data` into the slot and submit it
    fn queue_input(&self, slot: InputSlot, data: &[u8], timestamp_us: u64) -> Result<()>;

    async fn dequeue_output(&self, timeout: Duration) -> OutputStatus;

    /// Render and release an output buffer at `release_at`
    fn release_output(&self, index: usize, release_at: Instant);

    /// Current output dimensions, zero when not yet known
    fn output_format(&self) -> VideoRatio;
}

/// Creates decoder devices by MIME type
pub trait DecoderFactory: Send + Sync + 'static {
    fn create(&self, mime: &str) -> Result<Arc<dyn HardwareDecoder>>;
}

/// Decoder session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderState {
    Uninitialized,
    AwaitingConfig,
    Configuring,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecoderState::Uninitialized => "uninitialized",
            DecoderState::AwaitingConfig => "awaiting config",
            DecoderState::Configuring => "configuring",
            DecoderState::Running => "running",
            DecoderState::Stopping => "stopping",
            DecoderState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A decoded frame ready for presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub data: Bytes,
    pub ratio: VideoRatio,
}

/// Notifications from the drain task
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    Frame(DecodedFrame),
    RatioChanged(VideoRatio),
    InfoChanged(StatsSnapshot),
    /// The drain task exited on end-of-stream or a device fault.
    ///
    /// Sent best-effort like every event and lost if the queue is full; the
    /// state channel always ends on [`DecoderState::Stopped`].
    Stopped,
}

/// Microsecond timestamp of `at` relative to the driver's epoch
pub(crate) fn timestamp_us(epoch: Instant, at: Instant) -> u64 {
    at.saturating_duration_since(epoch).as_micros() as u64
}

//! Link configuration
//!
//! All values have defaults matching a stock wifibroadcast ground station
//! (link domain "default", video on radio port 0, telemetry on 0x10), so an
//! empty YAML document is a valid configuration.
//!
//! ```rust
//! use fpvlink::{CodecFamily, LinkConfig};
//!
//! let config = LinkConfig::from_yaml_str("codec: h264\nchannels: [149, 153]\n").unwrap();
//! assert_eq!(config.codec, CodecFamily::H264);
//! assert_eq!(config.channels, vec![149, 153]);
//! assert_eq!(config.link_id, 7669206);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::reassembler::DEFAULT_MAX_NAL_SIZE;
use crate::types::{Channel, CodecFamily, DEFAULT_CHANNELS, LogicalChannelId};
use crate::{LinkError, Result};

/// Link id derived from the link domain "default"
pub const DEFAULT_LINK_ID: u32 = 7669206;
pub const DEFAULT_VIDEO_PORT: u8 = 0x00;
pub const DEFAULT_TELEMETRY_PORT: u8 = 0x10;

/// Smallest accepted reassembly capacity
const MIN_NAL_SIZE: usize = 1024;

/// Scheduling priority hint passed to the hardware decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderPriority {
    Realtime,
    BestEffort,
}

impl DecoderPriority {
    /// Numeric value used by codec APIs (0 realtime, 1 best effort)
    pub fn as_raw(self) -> i32 {
        match self {
            DecoderPriority::Realtime => 0,
            DecoderPriority::BestEffort => 1,
        }
    }
}

/// Decoder driver timing and buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Bounded wait per input slot request
    pub input_timeout_ms: u64,
    /// Bounded wait per output slot request in the drain task
    pub output_timeout_ms: u64,
    /// Give up on a unit once input slot retries span this long
    pub feed_deadline_ms: u64,
    /// Interval between fps/bitrate/latency recomputations
    pub stats_interval_ms: u64,
    /// Samples kept per latency moving window
    pub latency_window: usize,
    /// Depth of the bounded decoder event queue
    pub event_queue: usize,
    pub low_latency: bool,
    pub priority: DecoderPriority,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            input_timeout_ms: 10,
            output_timeout_ms: 10,
            feed_deadline_ms: 1000,
            stats_interval_ms: 2000,
            latency_window: 120,
            event_queue: 16,
            low_latency: true,
            priority: DecoderPriority::Realtime,
        }
    }
}

impl DecoderSettings {
    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    pub fn output_timeout(&self) -> Duration {
        Duration::from_millis(self.output_timeout_ms)
    }

    pub fn feed_deadline(&self) -> Duration {
        Duration::from_millis(self.feed_deadline_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.feed_deadline_ms == 0 {
            return Err(LinkError::config("decoder.feed_deadline_ms must be positive"));
        }
        if self.stats_interval_ms == 0 {
            return Err(LinkError::config("decoder.stats_interval_ms must be positive"));
        }
        if self.latency_window == 0 {
            return Err(LinkError::config("decoder.latency_window must be positive"));
        }
        if self.event_queue == 0 {
            return Err(LinkError::config("decoder.event_queue must be positive"));
        }
        Ok(())
    }
}

/// Receive pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// 24-bit link identifier shared with the transmitter
    pub link_id: u32,
    pub video_port: u8,
    pub telemetry_port: u8,
    /// Radio channels in switching order
    pub channels: Vec<u16>,
    pub initial_channel_index: usize,
    /// Codec family assumed until a fragmentation unit reveals otherwise
    pub codec: CodecFamily,
    /// Video packets carry an RTP header in front of the NAL payload
    pub rtp_framing: bool,
    /// Upper bound for a reassembled NAL unit in bytes
    pub max_nal_size: usize,
    pub decoder: DecoderSettings,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            link_id: DEFAULT_LINK_ID,
            video_port: DEFAULT_VIDEO_PORT,
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            channels: DEFAULT_CHANNELS.to_vec(),
            initial_channel_index: 0,
            codec: CodecFamily::H265,
            rtp_framing: true,
            max_nal_size: DEFAULT_MAX_NAL_SIZE,
            decoder: DecoderSettings::default(),
        }
    }
}

impl LinkConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml =
            std::fs::read_to_string(path).map_err(|e| LinkError::io_error(path.to_path_buf(), e))?;
        debug!("Loaded link configuration from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(LinkError::config("channels must not be empty"));
        }
        if self.initial_channel_index >= self.channels.len() {
            return Err(LinkError::config(format!(
                "initial_channel_index {} out of range for {} channels",
                self.initial_channel_index,
                self.channels.len()
            )));
        }
        if self.link_id > 0x00FF_FFFF {
            return Err(LinkError::config(format!(
                "link_id {} does not fit in 24 bits",
                self.link_id
            )));
        }
        if self.video_port == self.telemetry_port {
            return Err(LinkError::config("video_port and telemetry_port must differ"));
        }
        if self.max_nal_size < MIN_NAL_SIZE {
            return Err(LinkError::config(format!(
                "max_nal_size must be at least {} bytes",
                MIN_NAL_SIZE
            )));
        }
        self.decoder.validate()
    }

    /// Channel id for one logical channel of this link
    pub fn channel_id(&self, channel: Channel) -> LogicalChannelId {
        match channel {
            Channel::Video => LogicalChannelId::new(self.link_id, self.video_port),
            Channel::Telemetry => LogicalChannelId::new(self.link_id, self.telemetry_port),
        }
    }
}

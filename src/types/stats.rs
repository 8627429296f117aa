//! Decoder statistics read model

use serde::{Deserialize, Serialize};

/// Immutable snapshot of link/decoder health
///
/// Produced by the statistics aggregator on every recomputation tick and
/// consumed by copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// NAL units handed to the decoder driver
    pub nalus_observed: u64,
    /// NAL units submitted to a decoder input slot
    pub nalus_fed: u64,
    /// Bytes submitted to decoder input slots
    pub bytes_fed: u64,
    /// Output buffers produced by the decoder
    pub frames_decoded: u64,
    /// Decoded frames per second over the last interval
    pub fps: f32,
    /// Input bitrate over the last interval in kilobits per second
    pub kbps: f32,
    /// Mean reassembly-to-submission latency
    pub avg_parse_ms: f32,
    /// Mean time spent waiting for a decoder input slot
    pub avg_wait_input_ms: f32,
    /// Mean submission-to-output latency
    pub avg_decode_ms: f32,
}

impl StatsSnapshot {
    /// Sum of the three latency averages
    pub fn total_latency_ms(&self) -> f32 {
        self.avg_parse_ms + self.avg_wait_input_ms + self.avg_decode_ms
    }
}

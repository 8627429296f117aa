//! Receive pipeline for wifibroadcast FPV video links.
//!
//! fpvlink turns raw 802.11 frames captured in monitor mode into decoded
//! video frames with bounded latency, and keeps running statistics on the
//! way.
//!
//! # Pipeline
//!
//! ```text
//! Transport ─► ChannelRouter ─► Aggregator ─► RTP ─► Reassembler ─► DecoderDriver ─► events
//!                   │                                                    │
//!                   └─► telemetry sink                                   └─► stats / state
//! ```
//!
//! - **Routing**: frames are validated and split into video and telemetry by
//!   the logical channel id embedded in their addresses
//! - **Reassembly**: H.264 FU-A and H.265 FU fragments are rebuilt into
//!   start-code-prefixed NAL units
//! - **Decoding**: a keyframe gate holds the decoder back until every
//!   parameter set has been seen, then a drain task pulls decoded frames
//! - **Channel switching**: the capture session moves between radio channels
//!   while the decoder keeps running
//!
//! The radio adapter, the decrypt/reorder stage and the hardware codec plug
//! in through [`transport::Transport`], [`transport::AggregatorFactory`] and
//! [`decoder::DecoderFactory`].
//!
//! ## Example (reassembly)
//!
//! ```rust
//! use fpvlink::reassembler::Reassembler;
//! use fpvlink::CodecFamily;
//!
//! let mut reassembler = Reassembler::new(CodecFamily::H264);
//! // FU-A start and end carrying an IDR slice
//! assert!(reassembler.on_fragment(&[0x7c, 0x85, 0x88, 0x84]).is_none());
//! let nalu = reassembler.on_fragment(&[0x7c, 0x45, 0x00, 0x33]).unwrap();
//! assert_eq!(&nalu.data()[..], &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00, 0x33]);
//! assert!(nalu.is_keyframe());
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Frame path
pub mod reassembler;
pub mod router;
pub mod rtp;

// Decoder path
pub mod decoder;
pub mod keyframe;
pub mod stats;

// Capture and sessions
pub mod link;
pub mod session;
pub mod transport;

// Core exports
pub use config::{DecoderPriority, DecoderSettings, LinkConfig};
pub use error::*;
pub use types::*;

// Main API exports
pub use decoder::{DecoderDriver, DecoderEvent, DecoderState};
pub use link::{FpvLink, LinkHandle};
pub use session::{LinkController, LinkSession, SessionSummary};
